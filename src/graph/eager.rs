//! Eager `ndarray` executor
//!
//! Runs each layer as soon as it is added. Convolution weights are drawn from a
//! seeded He-uniform distribution; batch normalization runs in inference mode
//! with freshly initialised statistics (mean 0, variance 1, scale 1, offset 0).

use ndarray::{Array2, Array4, ArrayD, ArrayView4, Axis, Ix1, Ix2, Ix4};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::ops::{same_output_size, same_padding_before, ConvBn, FullyConnected};
use super::params::ParamStore;
use super::GraphBuilder;
use crate::error::{NasError, Result};

/// Eager [`GraphBuilder`] over `ArrayD<f32>`
#[derive(Debug, Clone)]
pub struct EagerGraph {
    params: ParamStore<ArrayD<f32>>,
    rng: Xoshiro256PlusPlus,
}

/// Batch-norm epsilon
const BN_EPSILON: f32 = 1e-5;

impl EagerGraph {
    /// Create an executor whose weights are drawn from `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            params: ParamStore::new(),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    pub fn params(&self) -> &ParamStore<ArrayD<f32>> {
        &self.params
    }

    /// Fetch or create a He-uniform weight tensor
    fn weight(&mut self, name: &str, shape: &[usize], fan_in: usize) -> Result<ArrayD<f32>> {
        let bound = (6.0 / fan_in.max(1) as f32).sqrt();
        let rng = &mut self.rng;
        let value = self.params.get_or_create(name, shape, |shape| {
            ArrayD::from_shape_simple_fn(shape.to_vec(), || rng.gen_range(-bound..bound))
        })?;
        Ok(value.clone())
    }

    /// Fetch or create a constant-filled tensor
    fn constant(&mut self, name: &str, shape: &[usize], fill: f32) -> Result<ArrayD<f32>> {
        let value = self
            .params
            .get_or_create(name, shape, |shape| ArrayD::from_elem(shape.to_vec(), fill))?;
        Ok(value.clone())
    }
}

impl GraphBuilder for EagerGraph {
    type Tensor = ArrayD<f32>;

    fn conv_bn(&mut self, input: &ArrayD<f32>, conv: &ConvBn) -> Result<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix4>()?;
        let in_channels = x.len_of(Axis(1));
        conv.validate(in_channels)?;

        let fan_in = (in_channels / conv.num_groups) * conv.filter_size * conv.filter_size;
        let weights = self.weight(&conv.weight_name(), &conv.weight_shape(in_channels), fan_in)?;
        let weights = weights.into_dimensionality::<Ix4>()?;

        let bn_shape = [conv.num_filters];
        let scale = self
            .constant(&conv.bn_scale_name(), &bn_shape, 1.0)?
            .into_dimensionality::<Ix1>()?;
        let offset = self
            .constant(&conv.bn_offset_name(), &bn_shape, 0.0)?
            .into_dimensionality::<Ix1>()?;
        let mean = self
            .constant(&conv.bn_mean_name(), &bn_shape, 0.0)?
            .into_dimensionality::<Ix1>()?;
        let variance = self
            .constant(&conv.bn_variance_name(), &bn_shape, 1.0)?
            .into_dimensionality::<Ix1>()?;

        let mut out = conv2d(x, weights.view(), conv.stride, conv.num_groups);

        for (channel, mut plane) in out.axis_iter_mut(Axis(1)).enumerate() {
            let std = (variance[channel] + BN_EPSILON).sqrt();
            let (gamma, beta, mu) = (scale[channel], offset[channel], mean[channel]);
            match conv.act {
                Some(act) => plane.mapv_inplace(|v| act.apply((v - mu) / std * gamma + beta)),
                None => plane.mapv_inplace(|v| (v - mu) / std * gamma + beta),
            }
        }

        Ok(out.into_dyn())
    }

    fn elementwise_add(&mut self, x: &ArrayD<f32>, y: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        if x.shape() != y.shape() {
            return Err(NasError::ShapeError {
                expected: format!("{:?}", x.shape()),
                actual: format!("{:?}", y.shape()),
            });
        }
        Ok(x + y)
    }

    fn fc(&mut self, input: &ArrayD<f32>, fc: &FullyConnected) -> Result<ArrayD<f32>> {
        let Some((&n, rest)) = input.shape().split_first() else {
            return Err(NasError::ShapeError {
                expected: "tensor with a batch dimension".to_string(),
                actual: "scalar".to_string(),
            });
        };
        let features: usize = rest.iter().product();

        let flat: Array2<f32> = input
            .as_standard_layout()
            .into_owned()
            .into_shape((n, features))?;
        let weights = self
            .weight(&fc.weight_name, &[features, fc.size], features)?
            .into_dimensionality::<Ix2>()?;
        let bias = self.constant(&fc.bias_name, &[fc.size], 0.0)?;

        let out = flat.dot(&weights).into_dyn() + &bias;
        Ok(out)
    }

    fn shape(&self, tensor: &ArrayD<f32>) -> Vec<usize> {
        tensor.shape().to_vec()
    }
}

/// Grouped, SAME-padded 2-D convolution over an NCHW input
fn conv2d(input: ArrayView4<f32>, weights: ArrayView4<f32>, stride: usize, groups: usize) -> Array4<f32> {
    let (batch, _, height, width) = input.dim();
    let (filters, group_channels, kh, kw) = weights.dim();
    let filters_per_group = filters / groups;

    let oh = same_output_size(height, stride);
    let ow = same_output_size(width, stride);
    let pad_top = same_padding_before(height, kh, stride) as isize;
    let pad_left = same_padding_before(width, kw, stride) as isize;

    let mut out = Array4::<f32>::zeros((batch, filters, oh, ow));
    for b in 0..batch {
        for f in 0..filters {
            let base_channel = (f / filters_per_group) * group_channels;
            for y in 0..oh {
                for x in 0..ow {
                    let mut acc = 0.0f32;
                    for gc in 0..group_channels {
                        let channel = base_channel + gc;
                        for ky in 0..kh {
                            let iy = (y * stride + ky) as isize - pad_top;
                            if iy < 0 || iy >= height as isize {
                                continue;
                            }
                            for kx in 0..kw {
                                let ix = (x * stride + kx) as isize - pad_left;
                                if ix < 0 || ix >= width as isize {
                                    continue;
                                }
                                acc += input[[b, channel, iy as usize, ix as usize]]
                                    * weights[[f, gc, ky, kx]];
                            }
                        }
                    }
                    out[[b, f, y, x]] = acc;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Activation;
    use ndarray::Array;

    #[test]
    fn test_conv2d_identity_kernel() {
        let input = Array::from_shape_fn((1, 1, 3, 3), |(_, _, y, x)| (y * 3 + x) as f32);
        let mut kernel = Array4::<f32>::zeros((1, 1, 3, 3));
        kernel[[0, 0, 1, 1]] = 1.0;

        let out = conv2d(input.view(), kernel.view(), 1, 1);
        assert_eq!(out, input);
    }

    #[test]
    fn test_conv2d_same_padding_stride2() {
        let input = Array4::<f32>::ones((1, 1, 4, 4));
        let kernel = Array4::<f32>::ones((1, 1, 3, 3));

        let out = conv2d(input.view(), kernel.view(), 2, 1);
        assert_eq!(out.dim(), (1, 1, 2, 2));
        // padding goes bottom/right only: first window is fully inside
        assert_eq!(out[[0, 0, 0, 0]], 9.0);
        assert_eq!(out[[0, 0, 1, 1]], 4.0);
    }

    #[test]
    fn test_conv2d_depthwise_keeps_channels_apart() {
        let mut input = Array4::<f32>::zeros((1, 2, 1, 1));
        input[[0, 0, 0, 0]] = 1.0;
        input[[0, 1, 0, 0]] = 10.0;
        let kernel = Array4::<f32>::ones((2, 1, 1, 1));

        let out = conv2d(input.view(), kernel.view(), 1, 2);
        assert_eq!(out[[0, 0, 0, 0]], 1.0);
        assert_eq!(out[[0, 1, 0, 0]], 10.0);
    }

    #[test]
    fn test_conv_bn_relu6_bounds_output() {
        let mut graph = EagerGraph::new(7);
        let input = Array4::<f32>::from_elem((1, 3, 8, 8), 5.0).into_dyn();
        let conv = ConvBn::new("conv1_1", 4, 3)
            .with_stride(2)
            .with_act(Activation::Relu6);

        let out = graph.conv_bn(&input, &conv).unwrap();
        assert_eq!(out.shape(), &[1, 4, 4, 4]);
        assert!(out.iter().all(|&v| (0.0..=6.0).contains(&v)));
        assert_eq!(graph.params().len(), 5);
    }

    #[test]
    fn test_seeded_weights_are_reproducible() {
        let input = Array4::<f32>::from_elem((1, 2, 4, 4), 0.5).into_dyn();
        let conv = ConvBn::new("c", 3, 1);

        let a = EagerGraph::new(42).conv_bn(&input, &conv).unwrap();
        let b = EagerGraph::new(42).conv_bn(&input, &conv).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fc_output_shape() {
        let mut graph = EagerGraph::new(1);
        let input = Array4::<f32>::ones((2, 4, 1, 1)).into_dyn();
        let out = graph
            .fc(&input, &FullyConnected::new(3, "fc_w", "fc_b"))
            .unwrap();

        assert_eq!(out.shape(), &[2, 3]);
    }

    #[test]
    fn test_add_shape_mismatch() {
        let mut graph = EagerGraph::new(1);
        let a = Array4::<f32>::ones((1, 2, 2, 2)).into_dyn();
        let b = Array4::<f32>::ones((1, 2, 1, 1)).into_dyn();

        assert!(graph.elementwise_add(&a, &b).is_err());
        let sum = graph.elementwise_add(&a, &a).unwrap();
        assert!(sum.iter().all(|&v| v == 2.0));
    }
}
