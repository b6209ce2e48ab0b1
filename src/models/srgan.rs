//! SRGAN generator topology.
//!
//! Builds the super-resolution generator as graph nodes under the `SRGAN_g`
//! scope: a head convolution, a stack of residual blocks, a skip connection
//! around the stack, sub-pixel upsampling stages and a 1x1 tanh output. The
//! variable names follow the layout of the published weights archives
//! (`SRGAN_g/n64s1/c/W_conv2d`, `SRGAN_g/n64s1/b1/0/gamma`, ...).

use serde::{Deserialize, Serialize};

use crate::errors::{ExportError, Result};
use crate::graph::{GraphBuilder, Initializer};
use crate::layers::{
    Activation, BatchNormConfig, Conv2dConfig, LayerOutput, SubpixelConfig, elementwise_add,
};

/// Variable scope of the generator.
pub const SCOPE: &str = "SRGAN_g";

/// Default name of the image placeholder.
pub const INPUT_NAME: &str = "input_image";

/// Name of the generator output op.
pub const OUTPUT_NAME: &str = "SRGAN_g/out/Tanh";

/// Sizes of the generator. `Default` gives the published 4x model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrganConfig {
    /// Channels of the input and output images.
    pub image_channels: usize,
    /// Channels carried through the residual trunk.
    pub filters: usize,
    pub residual_blocks: usize,
    /// Channels produced before each pixel shuffle.
    pub upsample_filters: usize,
    pub upsample_stages: usize,
    /// Upscaling factor of each stage.
    pub upsample_scale: usize,
    pub kernel_size: usize,
    pub weight_stddev: f32,
    pub gamma_stddev: f32,
}

impl Default for SrganConfig {
    fn default() -> Self {
        Self {
            image_channels: 3,
            filters: 64,
            residual_blocks: 16,
            upsample_filters: 256,
            upsample_stages: 2,
            upsample_scale: 2,
            kernel_size: 3,
            weight_stddev: 0.02,
            gamma_stddev: 0.02,
        }
    }
}

impl SrganConfig {
    /// Overall upscaling factor.
    pub fn scale_factor(&self) -> usize {
        self.upsample_scale.pow(self.upsample_stages as u32)
    }

    fn validate(&self) -> Result<()> {
        let block = self.upsample_scale * self.upsample_scale;
        if self.image_channels == 0 || self.filters == 0 || self.kernel_size == 0 {
            return Err(ExportError::InvalidGraph(
                "generator sizes must be positive".to_string(),
            ));
        }
        if block == 0 || self.upsample_filters % block != 0 {
            return Err(ExportError::InvalidGraph(format!(
                "upsample_filters {} is not divisible by {block}",
                self.upsample_filters
            )));
        }
        Ok(())
    }

    fn weight_init(&self) -> Initializer {
        Initializer::RandomNormal {
            mean: 0.0,
            stddev: self.weight_stddev,
        }
    }

    fn conv(&self, filters: usize, kernel_size: usize) -> Conv2dConfig {
        Conv2dConfig::new(filters, kernel_size).with_weight_init(self.weight_init())
    }

    fn batch_norm(&self, is_train: bool) -> BatchNormConfig {
        BatchNormConfig::new()
            .with_training(is_train)
            .with_gamma_init(Initializer::RandomNormal {
                mean: 1.0,
                stddev: self.gamma_stddev,
            })
    }
}

/// A generator added to a graph.
#[derive(Debug, Clone)]
pub struct Generator {
    /// The tensor the generator reads.
    pub input: String,
    /// The tanh output, in [-1, 1].
    pub output: String,
    /// Every generator variable, in the order a weights archive lists them.
    pub parameters: Vec<String>,
}

/// Adds the SRGAN generator on top of `input` (NHWC, `image_channels` deep).
pub fn srgan_generator(
    builder: &mut GraphBuilder,
    input: &str,
    config: &SrganConfig,
    is_train: bool,
    reuse: bool,
) -> Result<Generator> {
    config.validate()?;
    let image = LayerOutput::input(input, config.image_channels);

    builder.with_variable_scope(SCOPE, reuse, |b| {
        let mut parameters = Vec::new();
        let mut collect = |layer: LayerOutput| {
            parameters.extend(layer.params.iter().cloned());
            layer
        };

        let k = config.kernel_size;
        let head = collect(
            config
                .conv(config.filters, k)
                .with_activation(Activation::Relu)
                .build(b, &image, "n64s1/c")?,
        );

        let mut trunk = head.clone();
        for i in 0..config.residual_blocks {
            let c1 = collect(config.conv(config.filters, k).without_bias().build(
                b,
                &trunk,
                &format!("n64s1/c1/{i}"),
            )?);
            let b1 = collect(
                config
                    .batch_norm(is_train)
                    .with_activation(Activation::Relu)
                    .build(b, &c1, &format!("n64s1/b1/{i}"))?,
            );
            let c2 = collect(config.conv(config.filters, k).without_bias().build(
                b,
                &b1,
                &format!("n64s1/c2/{i}"),
            )?);
            let b2 = collect(config.batch_norm(is_train).build(
                b,
                &c2,
                &format!("n64s1/b2/{i}"),
            )?);
            trunk = elementwise_add(b, &format!("b_residual_add/{i}"), &b2, &trunk)?;
        }

        let tail = collect(
            config
                .conv(config.filters, k)
                .without_bias()
                .build(b, &trunk, "n64s1/c/m")?,
        );
        let tail = collect(config.batch_norm(is_train).build(b, &tail, "n64s1/b/m")?);
        let mut net = elementwise_add(b, "add3", &tail, &head)?;

        for stage in 1..=config.upsample_stages {
            let expanded = collect(config.conv(config.upsample_filters, k).build(
                b,
                &net,
                &format!("n256s1/{stage}"),
            )?);
            net = SubpixelConfig::new(config.upsample_scale)
                .with_activation(Activation::Relu)
                .build(b, &expanded, &format!("pixelshufflerx2/{stage}"))?;
        }

        let out = collect(
            config
                .conv(config.image_channels, 1)
                .with_activation(Activation::Tanh)
                .build(b, &net, "out")?,
        );

        log::debug!(
            "Built {SCOPE} with {} residual blocks and {} parameters",
            config.residual_blocks,
            parameters.len()
        );
        Ok(Generator {
            input: input.to_string(),
            output: out.output,
            parameters,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpType;

    fn small_config() -> SrganConfig {
        SrganConfig {
            filters: 4,
            residual_blocks: 2,
            upsample_filters: 8,
            upsample_stages: 1,
            ..SrganConfig::default()
        }
    }

    fn build(config: &SrganConfig) -> (GraphBuilder, Generator) {
        let mut builder = GraphBuilder::new();
        let x = builder
            .placeholder(INPUT_NAME, vec![None, None, None, Some(3)])
            .unwrap();
        let generator = srgan_generator(&mut builder, &x, config, false, false).unwrap();
        (builder, generator)
    }

    #[test]
    fn test_default_config_matches_published_model() {
        let config = SrganConfig::default();
        assert_eq!(config.residual_blocks, 16);
        assert_eq!(config.filters, 64);
        assert_eq!(config.scale_factor(), 4);
    }

    #[test]
    fn test_output_name() {
        let (_, generator) = build(&small_config());
        assert_eq!(generator.output, OUTPUT_NAME);
        assert_eq!(generator.input, INPUT_NAME);
    }

    #[test]
    fn test_parameter_count_and_order() {
        let config = small_config();
        let (builder, generator) = build(&config);

        // head: W+b, per block: W, 4 bn, W, 4 bn, tail: W + 4 bn,
        // per stage: W+b, out: W+b
        let expected = 2 + config.residual_blocks * 10 + 5 + config.upsample_stages * 2 + 2;
        assert_eq!(generator.parameters.len(), expected);
        assert_eq!(generator.parameters, builder.global_variables());

        assert_eq!(generator.parameters[0], "SRGAN_g/n64s1/c/W_conv2d");
        assert_eq!(generator.parameters[1], "SRGAN_g/n64s1/c/b_conv2d");
        assert_eq!(generator.parameters[2], "SRGAN_g/n64s1/c1/0/W_conv2d");
        assert_eq!(generator.parameters[3], "SRGAN_g/n64s1/b1/0/beta");
        assert_eq!(
            generator.parameters.last().map(String::as_str),
            Some("SRGAN_g/out/b_conv2d")
        );
    }

    #[test]
    fn test_residual_convs_have_no_bias() {
        let (builder, _) = build(&small_config());
        let graph = builder.graph();
        assert!(graph.contains("SRGAN_g/n64s1/c1/0/W_conv2d"));
        assert!(!graph.contains("SRGAN_g/n64s1/c1/0/b_conv2d"));
        assert!(!graph.contains("SRGAN_g/n64s1/c/m/b_conv2d"));
        assert!(graph.contains("SRGAN_g/n256s1/1/b_conv2d"));
    }

    #[test]
    fn test_skip_connections() {
        let (builder, _) = build(&small_config());
        let graph = builder.graph();

        let add = graph.require("SRGAN_g/add3/Add").unwrap();
        assert_eq!(add.op, OpType::Add);
        assert_eq!(add.inputs[1], "SRGAN_g/n64s1/c/Relu");

        let first = graph.require("SRGAN_g/b_residual_add/0/Add").unwrap();
        assert_eq!(first.inputs[1], "SRGAN_g/n64s1/c/Relu");
        let second = graph.require("SRGAN_g/b_residual_add/1/Add").unwrap();
        assert_eq!(second.inputs[1], "SRGAN_g/b_residual_add/0/Add");
    }

    #[test]
    fn test_full_size_generator_builds() {
        let (builder, generator) = build(&SrganConfig::default());
        assert_eq!(generator.parameters.len(), 2 + 16 * 10 + 5 + 2 * 2 + 2);
        let shuffles = builder.graph().nodes_of(OpType::DepthToSpace).count();
        assert_eq!(shuffles, 2);
    }

    #[test]
    fn test_rebuild_without_reuse_fails() {
        let config = small_config();
        let (mut builder, generator) = build(&config);
        let result = srgan_generator(&mut builder, &generator.input, &config, false, false);
        assert!(matches!(result, Err(ExportError::VariableExists { .. })));
    }

    #[test]
    fn test_invalid_upsample_filters() {
        let config = SrganConfig {
            upsample_filters: 6,
            ..small_config()
        };
        let mut builder = GraphBuilder::new();
        let result = srgan_generator(&mut builder, "x", &config, false, false);
        assert!(matches!(result, Err(ExportError::InvalidGraph(_))));
    }
}
