//! Noisy circular trajectory generation and stride downsampling.

use std::f64::consts::PI;

use ndarray::{s, Array1};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::{NtError, Params};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub t: f64,
    pub x: f64,
    pub y: f64,
}

/// Dense trajectory: true circle positions and their noisy observations.
#[derive(Clone, Debug)]
pub struct Trajectory {
    pub times: Array1<f64>,
    pub x_true: Array1<f64>,
    pub y_true: Array1<f64>,
    pub x: Array1<f64>,
    pub y: Array1<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Noisy sample at `index`.
    pub fn sample(&self, index: usize) -> Option<Sample> {
        Some(Sample {
            t: *self.times.get(index)?,
            x: *self.x.get(index)?,
            y: *self.y.get(index)?,
        })
    }

    pub fn true_sample(&self, index: usize) -> Option<Sample> {
        Some(Sample {
            t: *self.times.get(index)?,
            x: *self.x_true.get(index)?,
            y: *self.y_true.get(index)?,
        })
    }

    /// Keep every `stride`-th noisy sample starting at index 0.
    pub fn downsample(&self, stride: usize) -> Result<Track, NtError> {
        if stride == 0 {
            return Err(NtError::InvalidParameter(
                "downsample stride must be >= 1".into(),
            ));
        }
        // Any stride at or beyond the length keeps only index 0.
        let step = stride.min(self.len().max(1)) as isize;
        Ok(Track {
            times: self.times.slice(s![..;step]).to_vec(),
            x: self.x.slice(s![..;step]).to_vec(),
            y: self.y.slice(s![..;step]).to_vec(),
        })
    }
}

/// Downsampled noisy track. Points lie in the z = 0 plane.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub times: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Track {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn sample(&self, index: usize) -> Option<Sample> {
        Some(Sample {
            t: *self.times.get(index)?,
            x: *self.x.get(index)?,
            y: *self.y.get(index)?,
        })
    }

    /// 3D points for `start..end`, clipped to the track length.
    pub fn points_3d(&self, start: usize, end: usize) -> Vec<[f64; 3]> {
        let end = end.min(self.len());
        (start.min(end)..end)
            .map(|i| [self.x[i], self.y[i], 0.0])
            .collect()
    }
}

/// One revolution of radius `params.radius` over `params.total_time`, sampled at
/// `t_i = i / fs`, with independent Gaussian noise per axis per sample.
pub fn generate_trajectory<R: Rng + ?Sized>(
    params: &Params,
    rng: &mut R,
) -> Result<Trajectory, NtError> {
    params.validate()?;
    let n = params.sample_count();
    let fs = params.fs_trajectory;
    let radius = params.radius;
    let omega = 2.0 * PI / params.total_time;

    let times = Array1::from_iter((0..n).map(|i| i as f64 / fs));
    let x_true = times.mapv(|t| radius * (omega * t).cos());
    let y_true = times.mapv(|t| radius * (omega * t).sin());

    let noise = Normal::new(0.0, params.noise_std)
        .map_err(|e| NtError::InvalidParameter(format!("noise_std: {e}")))?;
    let mut x = x_true.clone();
    let mut y = y_true.clone();
    for (xi, yi) in x.iter_mut().zip(y.iter_mut()) {
        *xi += noise.sample(rng);
        *yi += noise.sample(rng);
    }

    Ok(Trajectory {
        times,
        x_true,
        y_true,
        x,
        y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn sample_count_and_spacing() {
        let params = Params::default();
        let traj = generate_trajectory(&params, &mut seeded()).unwrap();
        assert_eq!(traj.len(), 6000);
        for w in traj.times.windows(2) {
            assert!((w[1] - w[0] - 0.01).abs() < 1e-9);
        }
        assert_eq!(traj.times[0], 0.0);
    }

    #[test]
    fn true_positions_lie_on_circle() {
        let params = Params::default();
        let traj = generate_trajectory(&params, &mut seeded()).unwrap();
        let r2 = params.radius * params.radius;
        for (x, y) in traj.x_true.iter().zip(traj.y_true.iter()) {
            assert!((x * x + y * y - r2).abs() < 1e-9);
        }
        let first = traj.true_sample(0).unwrap();
        assert!((first.x - 50.0).abs() < 1e-12);
        assert!(first.y.abs() < 1e-12);
    }

    #[test]
    fn zero_noise_stays_on_circle() {
        let params = Params {
            noise_std: 0.0,
            ..Params::default()
        };
        let traj = generate_trajectory(&params, &mut seeded()).unwrap();
        for i in 0..traj.len() {
            let s = traj.sample(i).unwrap();
            assert!((s.x.hypot(s.y) - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn noise_has_requested_spread() {
        let params = Params::default();
        let traj = generate_trajectory(&params, &mut seeded()).unwrap();
        let residuals: Vec<f64> = (&traj.x - &traj.x_true).to_vec();
        let n = residuals.len() as f64;
        let mean = residuals.iter().sum::<f64>() / n;
        let var = residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.1);
        assert!((var.sqrt() - 1.2).abs() < 0.1);
    }

    #[test]
    fn same_seed_same_trajectory() {
        let params = Params::default();
        let a = generate_trajectory(&params, &mut seeded()).unwrap();
        let b = generate_trajectory(&params, &mut seeded()).unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.y, b.y);
        let c = generate_trajectory(&params, &mut StdRng::seed_from_u64(43)).unwrap();
        assert_ne!(a.x, c.x);
    }

    #[test]
    fn downsample_picks_stride_multiples() {
        let params = Params {
            fs_trajectory: 8.0,
            total_time: 10.25,
            ..Params::default()
        };
        let traj = generate_trajectory(&params, &mut seeded()).unwrap();
        assert_eq!(traj.len(), 82);
        for stride in [1usize, 4, 7, 82, 200] {
            let track = traj.downsample(stride).unwrap();
            assert_eq!(track.len(), (traj.len() + stride - 1) / stride);
            for (k, &x) in track.x.iter().enumerate() {
                let s = traj.sample(k * stride).unwrap();
                assert_eq!(x, s.x);
                assert_eq!(track.y[k], s.y);
                assert_eq!(track.times[k], s.t);
            }
        }
    }

    #[test]
    fn downsample_rejects_zero_stride() {
        let traj = generate_trajectory(&Params::default(), &mut seeded()).unwrap();
        assert!(matches!(
            traj.downsample(0),
            Err(NtError::InvalidParameter(_))
        ));
    }

    #[test]
    fn oversized_stride_keeps_first_sample_only() {
        let traj = generate_trajectory(&Params::default(), &mut seeded()).unwrap();
        let track = traj.downsample(usize::MAX).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track.times, vec![0.0]);
        assert_eq!(track.x[0], traj.x[0]);
    }

    #[test]
    fn invalid_params_are_rejected_before_generation() {
        let params = Params {
            radius: 0.0,
            ..Params::default()
        };
        assert!(generate_trajectory(&params, &mut seeded()).is_err());
    }

    #[test]
    fn points_3d_clip_and_flatten() {
        let track = Track {
            times: vec![0.0, 1.0, 2.0],
            x: vec![1.0, 2.0, 3.0],
            y: vec![4.0, 5.0, 6.0],
        };
        assert_eq!(
            track.points_3d(1, 10),
            vec![[2.0, 5.0, 0.0], [3.0, 6.0, 0.0]]
        );
        assert!(track.points_3d(3, 3).is_empty());
    }
}
