//! Level generators
//!
//! A generator decodes latent vectors into per-cell tile distributions
//! `[batch, tiles, height, width]`. Its adapter turns those tiles into the
//! state tensors the agent observes, so the critic can score generated levels
//! directly and gradients flow back into the generator.

use tch::{Device, Kind, Tensor, nn};

pub mod mlp;

pub use mlp::{MlpGenerator, MlpGeneratorConfig};

/// Differentiable level generator
pub trait LevelGenerator {
    /// Latent vector length
    fn z_size(&self) -> i64;

    /// Shape `[channels, height, width]` of the states produced by
    /// [`adapter`](Self::adapter)
    fn state_shape(&self) -> [usize; 3];

    /// Parameters, for optimizers and checkpoints
    fn var_store(&self) -> &nn::VarStore;

    /// Mutable parameters, for checkpoint restore
    fn var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Decode latents `[batch, z_size]` into tile distributions
    fn forward(&self, z: &Tensor) -> Tensor;

    /// Map tile tensors to observation states
    fn adapter(&self, levels: &Tensor) -> Tensor;

    /// Device holding the parameters
    fn device(&self) -> Device {
        self.var_store().device()
    }

    /// Decode latents into discrete one-hot levels and their states
    ///
    /// Runs without gradients. Each cell takes its most likely tile.
    fn generate(&self, z: &Tensor) -> (Tensor, Tensor) {
        tch::no_grad(|| {
            let probs = self.forward(z);
            let tiles = probs.size()[1];
            let levels = probs.argmax(1, false).one_hot(tiles).permute([0, 3, 1, 2]).to_kind(Kind::Float);
            let states = self.adapter(&levels);
            (levels, states)
        })
    }
}
