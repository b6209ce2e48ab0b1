//! Batch normalization layer.

use crate::errors::Result;
use crate::graph::{GraphBuilder, Initializer};
use crate::layers::{Activation, LayerOutput};

/// Configuration for a BatchNorm layer.
///
/// Creates trainable `beta` and `gamma` plus non-trainable `moving_mean` and
/// `moving_variance`, all of length `channels`.
#[derive(Debug, Clone)]
pub struct BatchNormConfig {
    pub activation: Activation,
    /// Use batch statistics instead of the moving ones.
    pub is_train: bool,
    pub epsilon: f32,
    pub beta_init: Initializer,
    pub gamma_init: Initializer,
}

impl Default for BatchNormConfig {
    fn default() -> Self {
        Self {
            activation: Activation::None,
            is_train: false,
            epsilon: 1e-5,
            beta_init: Initializer::Constant(0.0),
            gamma_init: Initializer::RandomNormal {
                mean: 1.0,
                stddev: 0.02,
            },
        }
    }
}

impl BatchNormConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the activation function.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_training(mut self, is_train: bool) -> Self {
        self.is_train = is_train;
        self
    }

    pub fn with_gamma_init(mut self, init: Initializer) -> Self {
        self.gamma_init = init;
        self
    }

    /// Adds the layer to the graph under the scope `name`.
    pub fn build(
        &self,
        builder: &mut GraphBuilder,
        input: &LayerOutput,
        name: &str,
    ) -> Result<LayerOutput> {
        let channels = input.channels;
        builder.with_variable_scope(name, false, |b| {
            let scope = b.scope();
            let beta = b.variable("beta", vec![channels], self.beta_init, true)?;
            let gamma = b.variable("gamma", vec![channels], self.gamma_init, true)?;
            let mean = b.variable(
                "moving_mean",
                vec![channels],
                Initializer::Constant(0.0),
                false,
            )?;
            let variance = b.variable(
                "moving_variance",
                vec![channels],
                Initializer::Constant(1.0),
                false,
            )?;

            let normalized = b.fused_batch_norm(
                &input.output,
                [&gamma, &beta, &mean, &variance],
                self.epsilon,
                self.is_train,
            )?;
            let output = self.activation.emit(b, &normalized)?;

            let params = ["beta", "gamma", "moving_mean", "moving_variance"]
                .iter()
                .map(|p| format!("{scope}/{p}"))
                .collect();
            Ok(LayerOutput {
                output,
                channels,
                params,
            })
        })
    }
}
