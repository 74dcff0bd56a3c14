//! Composition of the mirror slope from autocollimator channels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ingest::header::Channel;
use crate::prelude::{PipelineError, PipelineResult};

/// Mounting of the mirror under test, which decides the channels involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Vertical,
    Horizontal,
    Full,
}

impl Orientation {
    pub fn channels(self) -> &'static [Channel] {
        match self {
            Orientation::Vertical => &[Channel::Sy, Channel::Vx],
            Orientation::Horizontal => &[Channel::Sx, Channel::Hx],
            Orientation::Full => &Channel::ALL,
        }
    }

    /// The six-channel profile is filtered on the full averaged grid and
    /// cropped afterwards; the two-channel ones crop first.
    pub fn filter_before_crop(self) -> bool {
        matches!(self, Orientation::Full)
    }

    /// Noise-filter order configured for `channel`.
    ///
    /// Two-channel orientations read the first two entries, reference channel
    /// first.
    pub fn filter_order(self, channel: Channel, orders: &[usize; 6]) -> usize {
        match (self, channel) {
            (Orientation::Vertical, Channel::Sy) | (Orientation::Horizontal, Channel::Sx) => {
                orders[0]
            }
            (Orientation::Vertical, Channel::Vx) | (Orientation::Horizontal, Channel::Hx) => {
                orders[1]
            }
            (Orientation::Full, ch) => orders[ch.index()],
            _ => 0,
        }
    }

    pub fn compose_slope(
        self,
        channels: &BTreeMap<Channel, Vec<f64>>,
        signs: &[f64; 6],
    ) -> PipelineResult<Vec<f64>> {
        let get = |ch: Channel| {
            channels
                .get(&ch)
                .map(Vec::as_slice)
                .ok_or(PipelineError::MissingChannel(ch))
        };

        match self {
            Orientation::Vertical => {
                let (sy, vx) = (get(Channel::Sy)?, get(Channel::Vx)?);
                Ok(vx.iter().zip(sy).map(|(v, s)| -(v - s)).collect())
            }
            Orientation::Horizontal => {
                let (sx, hx) = (get(Channel::Sx)?, get(Channel::Hx)?);
                Ok(hx.iter().zip(sx).map(|(h, s)| h - s).collect())
            }
            Orientation::Full => {
                let len = get(Channel::Hy)?.len();
                let mut slope = vec![0.0; len];
                for ch in Channel::ALL {
                    let values = get(ch)?;
                    let sign = signs[ch.index()];
                    for (acc, v) in slope.iter_mut().zip(values) {
                        *acc += v * sign;
                    }
                }
                Ok(slope)
            }
        }
    }
}

/// Keeps the samples with `|x| <= half_length`.
pub fn crop(
    x: &[f64],
    channels: &BTreeMap<Channel, Vec<f64>>,
    half_length: f64,
) -> (Vec<f64>, BTreeMap<Channel, Vec<f64>>) {
    let keep: Vec<usize> = x
        .iter()
        .enumerate()
        .filter(|(_, v)| v.abs() <= half_length)
        .map(|(i, _)| i)
        .collect();

    let cropped_x = keep.iter().map(|&i| x[i]).collect();
    let cropped = channels
        .iter()
        .map(|(&ch, values)| (ch, keep.iter().map(|&i| values[i]).collect()))
        .collect();
    (cropped_x, cropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(values: &[(Channel, Vec<f64>)]) -> BTreeMap<Channel, Vec<f64>> {
        values.iter().cloned().collect()
    }

    #[test]
    fn vertical_slope_is_negated_difference() {
        let data = channels(&[(Channel::Sy, vec![1.0, 2.0]), (Channel::Vx, vec![4.0, 1.0])]);
        let slope = Orientation::Vertical.compose_slope(&data, &[0.0; 6]).unwrap();
        assert_eq!(slope, vec![-3.0, 1.0]);
    }

    #[test]
    fn horizontal_slope_is_difference() {
        let data = channels(&[(Channel::Sx, vec![1.0, 2.0]), (Channel::Hx, vec![4.0, 1.0])]);
        let slope = Orientation::Horizontal.compose_slope(&data, &[0.0; 6]).unwrap();
        assert_eq!(slope, vec![3.0, -1.0]);
    }

    #[test]
    fn full_slope_weights_every_channel() {
        let data: BTreeMap<Channel, Vec<f64>> = Channel::ALL
            .iter()
            .map(|&ch| (ch, vec![ch.index() as f64 + 1.0]))
            .collect();
        let slope = Orientation::Full
            .compose_slope(&data, &[0.0, 0.0, -1.0, 0.0, 0.0, 1.0])
            .unwrap();
        assert_eq!(slope, vec![6.0 - 3.0]);
    }

    #[test]
    fn missing_channel_fails_composition() {
        let data = channels(&[(Channel::Sy, vec![1.0])]);
        assert!(matches!(
            Orientation::Vertical.compose_slope(&data, &[0.0; 6]),
            Err(PipelineError::MissingChannel(Channel::Vx))
        ));
    }

    #[test]
    fn crop_keeps_window_inclusive() {
        let x = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        let data = channels(&[(Channel::Sy, vec![0.0, 1.0, 2.0, 3.0, 4.0])]);
        let (cx, cd) = crop(&x, &data, 1.0);
        assert_eq!(cx, vec![-1.0, 0.0, 1.0]);
        assert_eq!(cd[&Channel::Sy], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn filter_orders_follow_orientation() {
        let orders = [3, 5, 0, 8, 0, 1];
        assert_eq!(Orientation::Vertical.filter_order(Channel::Sy, &orders), 3);
        assert_eq!(Orientation::Horizontal.filter_order(Channel::Hx, &orders), 5);
        assert_eq!(Orientation::Full.filter_order(Channel::Sx, &orders), 8);
    }
}
