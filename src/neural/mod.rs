//! # Neural Engine
//!
//! A multilayer network substrate with an evolvable topology: layers are
//! trained online by gradient descent and restructured by mutation. Used
//! by the neural condition, prediction and action representations.

pub mod activation;
pub mod args;
pub mod avgpool;
pub mod connected;
pub mod convolutional;
pub mod dropout;
pub mod layer;
pub mod lstm;
pub mod maxpool;
pub mod net;
pub mod noise;
pub mod recurrent;
pub mod softmax;
pub mod upsample;

pub use activation::Activation;
pub use args::LayerArgs;
pub use layer::{Layer, LayerKind};
pub use net::Net;
