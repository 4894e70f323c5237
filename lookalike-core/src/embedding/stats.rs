//! A model-free backbone for fixtures and smoke runs.

use ndarray::{s, Array4};

use crate::embedding::Backbone;

const GRID: usize = 2;

/// Mean of each normalized channel over a 2x2 grid of the input, giving a 12 dimensional vector.
/// Deterministic and cheap, so catalogs can be indexed and queried without an exported model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelStatsBackbone;

impl ChannelStatsBackbone {
    pub const DIMENSION: usize = 3 * GRID * GRID;
}

impl Backbone for ChannelStatsBackbone {
    fn output_dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, anyhow::Error> {
        let (height, width) = (input.shape()[2], input.shape()[3]);
        if height < GRID || width < GRID {
            anyhow::bail!("Input of {}x{} is too small for a {}x{} grid", width, height, GRID, GRID);
        }

        let (cell_h, cell_w) = (height / GRID, width / GRID);
        let mut vector = Vec::with_capacity(Self::DIMENSION);
        for channel in 0..3 {
            for row in 0..GRID {
                for col in 0..GRID {
                    let cell = input.slice(s![
                        0,
                        channel,
                        row * cell_h..(row + 1) * cell_h,
                        col * cell_w..(col + 1) * cell_w
                    ]);
                    vector.push(cell.mean().unwrap_or(0.0));
                }
            }
        }

        Ok(vector)
    }
}
