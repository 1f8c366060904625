//! A small teaching library for feed-forward neural networks with a
//! PyTorch-like API: scalar autograd, layers and activations, loss
//! criteria, optimizers, mini-batch loading, tabular and image dataset
//! preprocessing, checkpointing, and plotting.

pub mod autograd;
pub mod checkpoint;
pub mod dataloader;
pub mod grad_fns;
pub mod images;
pub mod loss;
pub mod nn;
pub mod optim;
pub mod perceptron;
pub mod plot;
pub mod tabular;
