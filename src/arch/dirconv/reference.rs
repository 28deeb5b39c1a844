//! Naive sliding-window convolution used to verify the engine.

use super::layout::TensorShape;

/// Same-size, stride-1, zero-padded grouped convolution over dense NCHW input.
///
/// `weights` is OIHW with `shape.channels / num_groups` input channels per filter.
/// Output has `out_channels` channels in total and the spatial extent of the input.
pub fn conv2d_reference(
  input: &[f32],
  shape: TensorShape,
  weights: &[f32],
  bias: &[f32],
  out_channels: usize,
  kernel_size: usize,
  num_groups: usize,
) -> Vec<f32> {
  let TensorShape {
    images,
    channels,
    height,
    width,
  } = shape;
  let in_per_group = channels / num_groups;
  let out_per_group = out_channels / num_groups;
  let half = (kernel_size / 2) as isize;
  let mut output = vec![0.0f32; images * out_channels * height * width];

  for n in 0..images {
    for oc in 0..out_channels {
      let group = oc / out_per_group;
      for oy in 0..height {
        for ox in 0..width {
          let mut sum = 0.0f32;
          for ic in 0..in_per_group {
            let channel = group * in_per_group + ic;
            for ky in 0..kernel_size {
              let iy = oy as isize + ky as isize - half;
              if iy < 0 || iy >= height as isize {
                continue;
              }
              for kx in 0..kernel_size {
                let ix = ox as isize + kx as isize - half;
                if ix < 0 || ix >= width as isize {
                  continue;
                }
                let in_idx = ((n * channels + channel) * height + iy as usize) * width + ix as usize;
                let w_idx = ((oc * in_per_group + ic) * kernel_size + ky) * kernel_size + kx;
                sum += input[in_idx] * weights[w_idx];
              }
            }
          }
          output[((n * out_channels + oc) * height + oy) * width + ox] = sum + bias[oc];
        }
      }
    }
  }
  output
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_identity_kernel() {
    let shape = TensorShape::new(1, 1, 3, 3);
    let input: Vec<f32> = (0..9).map(|i| i as f32).collect();
    let mut w = vec![0.0; 9];
    w[4] = 1.0;
    assert_eq!(conv2d_reference(&input, shape, &w, &[0.5], 1, 3, 1), input.iter().map(|v| v + 0.5).collect::<Vec<_>>());
  }

  #[test]
  fn test_groups_see_own_channels() {
    // two groups of one channel each, 1x1 filters of weight 1
    let shape = TensorShape::new(1, 2, 1, 2);
    let out = conv2d_reference(&[1.0, 2.0, 10.0, 20.0], shape, &[1.0, 1.0], &[0.0, 0.0], 2, 1, 2);
    assert_eq!(out, vec![1.0, 2.0, 10.0, 20.0]);
  }
}
