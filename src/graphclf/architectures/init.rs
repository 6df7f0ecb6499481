//! Seeded parameter initialisation.
//!
//! Every trainable matrix is drawn from a `StdRng` derived from the run seed plus
//! a fixed per-layer offset, so two classifiers built from the same config and
//! seed start from identical parameters on any backend.
//!
//! SEED OFFSET POLICY:
//! - +100 series: embedding node projections and message weights
//! - +200 series: graph convolution stack (one offset per layer)
//! - +300 series: embedding output projections
//! - +400 series: classifier head
//! - +500 series: 1-D convolutions after SortPooling

use burn::{
    module::{Module, Param},
    nn::conv::{Conv1d, Conv1dConfig},
    tensor::{backend::Backend, Tensor},
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Linear layer whose weights come from [`SeededInit`].
#[derive(Module, Debug)]
pub struct SeededLinear<B: Backend> {
    /// Weight matrix of shape [output_dim, input_dim]
    pub weight: Param<Tensor<B, 2>>,
    /// Bias vector of shape [output_dim]
    pub bias: Option<Param<Tensor<B, 1>>>,
}

impl<B: Backend> SeededLinear<B> {
    pub fn new(weight: Tensor<B, 2>, bias: Option<Tensor<B, 1>>) -> Self {
        Self {
            weight: Param::from_tensor(weight),
            bias: bias.map(Param::from_tensor),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weight.dims()[1]
    }

    pub fn output_dim(&self) -> usize {
        self.weight.dims()[0]
    }

    pub fn device(&self) -> B::Device {
        self.weight.device()
    }

    /// `[n, input_dim] -> [n, output_dim]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let output = input.matmul(self.weight.val().transpose());
        match &self.bias {
            Some(bias) => output + bias.val().unsqueeze(),
            None => output,
        }
    }
}

/// Seed + device pair handed to every constructor.
#[derive(Debug, Clone)]
pub struct SeededInit<B: Backend> {
    pub seed: u64,
    device: B::Device,
}

impl<B: Backend> SeededInit<B> {
    pub fn new(seed: u64, device: B::Device) -> Self {
        Self { seed, device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Glorot-normal weights, small normal bias.
    pub fn linear(&self, input_dim: usize, output_dim: usize, bias: bool, offset: u64) -> SeededLinear<B> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(offset));

        let std = (2.0 / (input_dim + output_dim) as f32).sqrt();
        let weight = self.normal_tensor([output_dim, input_dim], &mut rng, std);
        let bias = bias.then(|| self.normal_tensor([output_dim], &mut rng, 0.01));

        SeededLinear::new(weight, bias)
    }

    /// 1-D convolution with seeded Glorot-normal kernels over `[out, in, kernel]`.
    pub fn conv1d(
        &self,
        channels_in: usize,
        channels_out: usize,
        kernel_size: usize,
        stride: usize,
        offset: u64,
    ) -> Conv1d<B> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(offset));
        let mut conv = Conv1dConfig::new(channels_in, channels_out, kernel_size)
            .with_stride(stride)
            .init(&self.device);

        let fan_in = channels_in * kernel_size;
        let fan_out = channels_out * kernel_size;
        let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
        conv.weight = Param::from_tensor(self.normal_tensor([channels_out, channels_in, kernel_size], &mut rng, std));
        conv.bias = Some(Param::from_tensor(self.normal_tensor([channels_out], &mut rng, 0.01)));
        conv
    }

    fn normal_tensor<const D: usize>(&self, shape: [usize; D], rng: &mut StdRng, std: f32) -> Tensor<B, D> {
        let total: usize = shape.iter().product();
        let data: Vec<f32> = match Normal::new(0.0, std) {
            Ok(normal) => (0..total).map(|_| normal.sample(rng)).collect(),
            // std is only invalid for degenerate zero-sized layers
            Err(_) => vec![0.0; total],
        };
        Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_same_seed_same_weights() {
        let device = <TestBackend as Backend>::Device::default();
        let a = SeededInit::<TestBackend>::new(7, device.clone()).linear(4, 3, true, 100);
        let b = SeededInit::<TestBackend>::new(7, device.clone()).linear(4, 3, true, 100);

        assert_eq!(a.weight.val().to_data(), b.weight.val().to_data());
        assert_eq!(a.input_dim(), 4);
        assert_eq!(a.output_dim(), 3);
    }

    #[test]
    fn test_offset_changes_weights() {
        let device = <TestBackend as Backend>::Device::default();
        let init = SeededInit::<TestBackend>::new(7, device.clone());
        let a = init.linear(4, 3, false, 100);
        let b = init.linear(4, 3, false, 101);
        assert_ne!(a.weight.val().to_data(), b.weight.val().to_data());
        assert!(a.bias.is_none());
    }

    #[test]
    fn test_conv1d_is_seeded() {
        let device = <TestBackend as Backend>::Device::default();
        let a = SeededInit::<TestBackend>::new(3, device.clone()).conv1d(1, 4, 6, 6, 200);
        let b = SeededInit::<TestBackend>::new(3, device.clone()).conv1d(1, 4, 6, 6, 200);

        assert_eq!(a.weight.dims(), [4, 1, 6]);
        assert_eq!(a.weight.val().to_data(), b.weight.val().to_data());
    }

    #[test]
    fn test_forward_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let layer = SeededInit::<TestBackend>::new(1, device.clone()).linear(5, 2, true, 0);
        let x = Tensor::<TestBackend, 2>::ones([3, 5], &device);
        assert_eq!(layer.forward(x).dims(), [3, 2]);
    }
}
