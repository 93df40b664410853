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

mod error;
mod image;
pub mod imat;
pub mod imesh;
pub mod itex;
pub mod lod;
mod material;
pub mod meshattrs;
mod mips;
mod model;
pub mod pixels;
pub mod rgbe;
mod scene;
mod types;

pub use error::*;
pub use image::*;
pub use material::*;
pub use mips::*;
pub use model::*;
pub use scene::*;
pub use types::*;
