// Copyright (C) 2023 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use glam::Vec3;

/// Local axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn zero() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }

    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Collapses a never-grown box to the zero box.
    pub fn fix_if_empty(self) -> Self {
        if self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z {
            Self::zero()
        } else {
            self
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bounds = Self::empty();
        let mut any = false;
        for p in points {
            bounds.grow(p);
            any = true;
        }
        if any {
            bounds.fix_if_empty()
        } else {
            Self::zero()
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod test {
    use glam::Vec3;

    use crate::Aabb;

    #[test]
    fn grow_points() {
        let bounds = Aabb::from_points([
            Vec3::new(1.0, -2.0, 0.5),
            Vec3::new(-1.0, 3.0, 0.0),
            Vec3::new(0.0, 0.0, -4.0),
        ]);
        assert_eq!(Vec3::new(-1.0, -2.0, -4.0), bounds.min);
        assert_eq!(Vec3::new(1.0, 3.0, 0.5), bounds.max);
    }

    #[test]
    fn empty_collapses_to_zero() {
        assert_eq!(Aabb::zero(), Aabb::empty().fix_if_empty());
        assert_eq!(Aabb::zero(), Aabb::from_points([]));
    }
}
