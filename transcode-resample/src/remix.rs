//! Channel remixing.
//!
//! Named layouts are described by speaker positions and mixed with a
//! coefficient matrix: centre into left/right at -3 dB, surrounds into the
//! same-side front at -3 dB, LFE dropped unless the output carries one.
//! `Custom` layouts have no positions; channels are copied by index and
//! missing ones are silent.

use std::f64::consts::FRAC_1_SQRT_2;
use transcode_core::ChannelLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Speaker {
    FrontLeft,
    FrontRight,
    FrontCenter,
    LowFrequency,
    BackLeft,
    BackRight,
    SideLeft,
    SideRight,
}

use Speaker::*;

fn speakers(layout: ChannelLayout) -> Option<&'static [Speaker]> {
    Some(match layout {
        ChannelLayout::Mono => &[FrontCenter],
        ChannelLayout::Stereo => &[FrontLeft, FrontRight],
        ChannelLayout::Surround21 => &[FrontLeft, FrontRight, LowFrequency],
        ChannelLayout::Quad => &[FrontLeft, FrontRight, BackLeft, BackRight],
        ChannelLayout::Surround50 => &[FrontLeft, FrontRight, FrontCenter, BackLeft, BackRight],
        ChannelLayout::Surround51 => &[
            FrontLeft,
            FrontRight,
            FrontCenter,
            LowFrequency,
            BackLeft,
            BackRight,
        ],
        ChannelLayout::Surround71 => &[
            FrontLeft,
            FrontRight,
            FrontCenter,
            LowFrequency,
            BackLeft,
            BackRight,
            SideLeft,
            SideRight,
        ],
        ChannelLayout::Custom(_) => return None,
    })
}

/// Mixing matrix from one layout to another.
#[derive(Debug, Clone, PartialEq)]
pub struct RemixMatrix {
    /// `coeffs[out][in]`.
    coeffs: Vec<Vec<f64>>,
    identity: bool,
}

impl RemixMatrix {
    /// Build the matrix mixing `input` into `output`.
    pub fn new(input: ChannelLayout, output: ChannelLayout) -> Self {
        let in_count = input.channels() as usize;
        let out_count = output.channels() as usize;
        let mut coeffs = vec![vec![0.0; in_count]; out_count];

        match (speakers(input), speakers(output)) {
            (Some(src), Some(dst)) if input != output => {
                let find = |s: Speaker| dst.iter().position(|&d| d == s);
                for (i, &speaker) in src.iter().enumerate() {
                    for (o, gain) in route(speaker, &find) {
                        coeffs[o][i] += gain;
                    }
                }
            }
            _ => {
                for (c, row) in coeffs.iter_mut().enumerate().take(in_count) {
                    row[c] = 1.0;
                }
            }
        }

        let identity = in_count == out_count
            && coeffs.iter().enumerate().all(|(o, row)| {
                row.iter()
                    .enumerate()
                    .all(|(i, &g)| g == if i == o { 1.0 } else { 0.0 })
            });
        Self { coeffs, identity }
    }

    /// Check if the matrix passes every channel through unchanged.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Get the gain of input channel `input` in output channel `output`.
    pub fn gain(&self, output: usize, input: usize) -> f64 {
        self.coeffs
            .get(output)
            .and_then(|row| row.get(input))
            .copied()
            .unwrap_or(0.0)
    }

    /// Mix planar channels.
    pub fn apply(&self, input: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let len = input.first().map_or(0, Vec::len);
        self.coeffs
            .iter()
            .map(|row| {
                let mut out = vec![0.0; len];
                for (samples, &gain) in input.iter().zip(row) {
                    if gain == 0.0 {
                        continue;
                    }
                    for (o, &s) in out.iter_mut().zip(samples) {
                        *o += s * gain;
                    }
                }
                out
            })
            .collect()
    }
}

/// Output positions and gains receiving `speaker`.
fn route(speaker: Speaker, find: &impl Fn(Speaker) -> Option<usize>) -> Vec<(usize, f64)> {
    if let Some(o) = find(speaker) {
        return vec![(o, 1.0)];
    }
    let pair = |l: Speaker, r: Speaker| find(l).zip(find(r));
    match speaker {
        FrontCenter => match pair(FrontLeft, FrontRight) {
            Some((l, r)) => vec![(l, FRAC_1_SQRT_2), (r, FRAC_1_SQRT_2)],
            None => Vec::new(),
        },
        FrontLeft | FrontRight => find(FrontCenter).map_or_else(Vec::new, |c| vec![(c, 0.5)]),
        LowFrequency => Vec::new(),
        BackLeft | BackRight | SideLeft | SideRight => {
            let left = matches!(speaker, BackLeft | SideLeft);
            let sibling = match speaker {
                BackLeft => SideLeft,
                BackRight => SideRight,
                SideLeft => BackLeft,
                _ => BackRight,
            };
            if let Some(o) = find(sibling) {
                return vec![(o, 1.0)];
            }
            let front = if left { FrontLeft } else { FrontRight };
            if let Some(o) = find(front) {
                vec![(o, FRAC_1_SQRT_2)]
            } else if let Some(c) = find(FrontCenter) {
                vec![(c, 0.5 * FRAC_1_SQRT_2)]
            } else {
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_same_layout_is_identity() {
        assert!(RemixMatrix::new(ChannelLayout::Stereo, ChannelLayout::Stereo).is_identity());
        assert!(RemixMatrix::new(ChannelLayout::Custom(3), ChannelLayout::Custom(3)).is_identity());
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let m = RemixMatrix::new(ChannelLayout::Stereo, ChannelLayout::Mono);
        let out = m.apply(&[vec![1.0, 0.2], vec![0.0, 0.2]]);
        assert_eq!(out.len(), 1);
        assert!((out[0][0] - 0.5).abs() < EPS);
        assert!((out[0][1] - 0.2).abs() < EPS);
    }

    #[test]
    fn test_mono_to_stereo_minus_3db() {
        let m = RemixMatrix::new(ChannelLayout::Mono, ChannelLayout::Stereo);
        assert!((m.gain(0, 0) - FRAC_1_SQRT_2).abs() < EPS);
        assert!((m.gain(1, 0) - FRAC_1_SQRT_2).abs() < EPS);
    }

    #[test]
    fn test_surround51_downmix() {
        let m = RemixMatrix::new(ChannelLayout::Surround51, ChannelLayout::Stereo);
        // FL FR FC LFE BL BR
        assert_eq!(m.gain(0, 0), 1.0);
        assert_eq!(m.gain(0, 1), 0.0);
        assert!((m.gain(0, 2) - FRAC_1_SQRT_2).abs() < EPS);
        assert_eq!(m.gain(0, 3), 0.0);
        assert!((m.gain(0, 4) - FRAC_1_SQRT_2).abs() < EPS);
        assert_eq!(m.gain(0, 5), 0.0);
        assert!((m.gain(1, 5) - FRAC_1_SQRT_2).abs() < EPS);
    }

    #[test]
    fn test_surround71_to_51_folds_sides() {
        let m = RemixMatrix::new(ChannelLayout::Surround71, ChannelLayout::Surround51);
        assert_eq!(m.gain(4, 4), 1.0);
        assert_eq!(m.gain(4, 6), 1.0);
        assert_eq!(m.gain(5, 7), 1.0);
        assert_eq!(m.gain(3, 3), 1.0);
    }

    #[test]
    fn test_custom_truncates_and_fills() {
        let down = RemixMatrix::new(ChannelLayout::Custom(3), ChannelLayout::Stereo);
        let out = down.apply(&[vec![0.1], vec![0.2], vec![0.3]]);
        assert_eq!(out, vec![vec![0.1], vec![0.2]]);

        let up = RemixMatrix::new(ChannelLayout::Stereo, ChannelLayout::Custom(3));
        let out = up.apply(&[vec![0.1], vec![0.2]]);
        assert_eq!(out, vec![vec![0.1], vec![0.2], vec![0.0]]);
    }
}
