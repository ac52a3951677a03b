//! Burn network for both classifiers
//!
//! The plant-presence gate and the species classifier load records of the
//! same convolutional network. They differ in class count and weights.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Shape of a deployed classifier record.
///
/// Gate and species records are both stored with this layout, so loading a
/// record only needs the class count it was exported with.
#[derive(Config, Debug)]
pub struct ConvClassifierConfig {
    /// Output width; the species record ships with 86
    #[config(default = "86")]
    pub num_classes: usize,

    /// Dropout before the output layer; a no-op without autodiff
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters in the first stage; every later stage doubles it
    #[config(default = "32")]
    pub base_filters: usize,

    #[config(default = "4")]
    pub stages: usize,

    /// Width of the hidden fully connected layer
    #[config(default = "256")]
    pub hidden_units: usize,
}

/// One downsampling stage: same-padded 3x3 conv, batch norm, ReLU, 2x2 max pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.bn.forward(self.conv.forward(x)));
        self.pool.forward(x)
    }
}

/// Fixed-topology network behind both pipeline stages.
///
/// Each stage halves the spatial size, so inputs must be at least
/// `2^stages` pixels wide. Global average pooling makes the head
/// independent of the exact input size.
#[derive(Module, Debug)]
pub struct ConvClassifier<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> ConvClassifier<B> {
    pub fn new(config: &ConvClassifierConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.stages);
        let mut channels = config.in_channels;
        for stage in 0..config.stages {
            let filters = config.base_filters << stage;
            blocks.push(ConvBlock::new(channels, filters, device));
            channels = filters;
        }

        Self {
            blocks,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(channels, config.hidden_units).init(device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            fc2: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Raw class scores for an NCHW batch, `[batch, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = Relu::new().forward(self.fc1.forward(x));
        self.fc2.forward(self.dropout.forward(x))
    }

    /// Class probabilities; each row sums to one
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
