//! Proximity-ray sensing abstractions for arena agents.
//!
//! The core crate consumes ray records through the [`ProximitySensor`] seam so
//! a host runtime with its own ray caster can be substituted without touching
//! the reward logic.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by proximity sensor implementations.
#[derive(Debug, Error)]
pub enum SenseError {
    /// Indicates configuration values that cannot be used (e.g., zero rays).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// A circular target a ray can strike, tagged with caller-defined data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayTarget<T> {
    pub x: f32,
    pub z: f32,
    pub radius: f32,
    pub tag: T,
}

/// Record produced for a ray that struck a target.
///
/// `fraction` is the hit distance normalized by the sensor range, in [0, 1];
/// consumers score proximity as `1.0 - fraction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit<T> {
    pub tag: T,
    pub fraction: f32,
}

/// Common behaviour exposed by proximity sensors.
pub trait ProximitySensor<T: Copy> {
    /// Number of rays this sensor casts per sweep.
    fn ray_count(&self) -> usize;

    /// Cast all rays from `origin` in the XZ plane, facing `yaw_degrees`
    /// (0 = +Z, 90 = +X, clockwise from above). Returns one record per ray
    /// in fan order; `None` marks a miss.
    fn cast(&self, origin: (f32, f32), yaw_degrees: f32, targets: &[RayTarget<T>])
    -> Vec<Option<RayHit<T>>>;
}

/// Planar fan of rays spread symmetrically around the facing direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanRaySensor {
    rays: usize,
    half_arc_degrees: f32,
    range: f32,
}

impl FanRaySensor {
    /// Create a fan sensor with `rays` rays spread over `±half_arc_degrees`.
    pub fn new(rays: usize, half_arc_degrees: f32, range: f32) -> Result<Self, SenseError> {
        if rays == 0 {
            return Err(SenseError::InvalidConfig("ray count must be non-zero"));
        }
        if !(0.0..=180.0).contains(&half_arc_degrees) {
            return Err(SenseError::InvalidConfig(
                "half arc must be within [0, 180] degrees",
            ));
        }
        if range <= 0.0 || !range.is_finite() {
            return Err(SenseError::InvalidConfig("range must be positive"));
        }
        Ok(Self {
            rays,
            half_arc_degrees,
            range,
        })
    }

    /// Sensor range in world units.
    #[must_use]
    pub const fn range(&self) -> f32 {
        self.range
    }

    /// Yaw offsets of each ray relative to the facing direction, in degrees.
    fn ray_offsets(&self) -> Vec<f32> {
        if self.rays == 1 {
            return vec![0.0];
        }
        let step = (self.half_arc_degrees * 2.0) / (self.rays - 1) as f32;
        (0..self.rays)
            .map(|i| -self.half_arc_degrees + step * i as f32)
            .collect()
    }

    /// Distance along a unit ray at which it enters the target circle, if any.
    fn ray_circle_entry(
        origin: (f32, f32),
        dir: (f32, f32),
        center: (f32, f32),
        radius: f32,
        range: f32,
    ) -> Option<f32> {
        let to_center = (center.0 - origin.0, center.1 - origin.1);
        let along = to_center.0 * dir.0 + to_center.1 * dir.1;
        if along < 0.0 {
            return None;
        }
        let center_dist_sq = to_center.0 * to_center.0 + to_center.1 * to_center.1;
        let perp_sq = center_dist_sq - along * along;
        let radius_sq = radius * radius;
        if perp_sq > radius_sq {
            return None;
        }
        let entry = (along - (radius_sq - perp_sq).sqrt()).max(0.0);
        (entry <= range).then_some(entry)
    }
}

impl<T: Copy> ProximitySensor<T> for FanRaySensor {
    fn ray_count(&self) -> usize {
        self.rays
    }

    fn cast(
        &self,
        origin: (f32, f32),
        yaw_degrees: f32,
        targets: &[RayTarget<T>],
    ) -> Vec<Option<RayHit<T>>> {
        self.ray_offsets()
            .into_iter()
            .map(|offset| {
                let yaw = (yaw_degrees + offset).to_radians();
                // Yaw is clockwise from +Z, so the planar direction is (sin, cos).
                let dir = (yaw.sin(), yaw.cos());
                targets
                    .iter()
                    .filter_map(|target| {
                        Self::ray_circle_entry(
                            origin,
                            dir,
                            (target.x, target.z),
                            target.radius,
                            self.range,
                        )
                        .map(|entry| (OrderedFloat(entry), target.tag))
                    })
                    .min_by_key(|(entry, _)| *entry)
                    .map(|(entry, tag)| RayHit {
                        tag,
                        fraction: entry.into_inner() / self.range,
                    })
            })
            .collect()
    }
}
