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

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;

use crate::{
    traits::{BinaryDeserialization, BinarySerialization},
    Aabb, Handle,
};

// On-disk handles are the packed value half plus type and meta, 8 bytes.
impl BinarySerialization for Handle {
    fn serialize(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.value())?;
        w.write_u16::<LittleEndian>(self.ty())?;
        w.write_u16::<LittleEndian>(self.meta())?;

        Ok(())
    }
}

impl BinaryDeserialization for Handle {
    fn deserialize(r: &mut impl Read) -> io::Result<Self> {
        let value = r.read_u32::<LittleEndian>()?;
        let ty = r.read_u16::<LittleEndian>()?;
        let meta = r.read_u16::<LittleEndian>()?;

        Ok(Handle::from_parts(value, ty, meta))
    }
}

impl BinarySerialization for Aabb {
    fn serialize(&self, w: &mut impl Write) -> io::Result<()> {
        for v in [self.min, self.max] {
            w.write_f32::<LittleEndian>(v.x)?;
            w.write_f32::<LittleEndian>(v.y)?;
            w.write_f32::<LittleEndian>(v.z)?;
        }

        Ok(())
    }
}

impl BinaryDeserialization for Aabb {
    fn deserialize(r: &mut impl Read) -> io::Result<Self> {
        let mut v = [0.0f32; 6];
        for x in v.iter_mut() {
            *x = r.read_f32::<LittleEndian>()?;
        }

        Ok(Aabb {
            min: Vec3::new(v[0], v[1], v[2]),
            max: Vec3::new(v[3], v[4], v[5]),
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use glam::Vec3;

    use crate::{Aabb, BinaryDeserialization, BinarySerialization, Handle};

    #[test]
    fn handle_roundtrip() {
        let handle = Handle::new(1, 12, 7).with_meta(3);
        let mut buf = Vec::new();
        handle.serialize(&mut buf).unwrap();
        assert_eq!(8, buf.len());
        assert_eq!(handle, Handle::deserialize(&mut Cursor::new(buf)).unwrap());
    }

    #[test]
    fn aabb_roundtrip() {
        let bounds = Aabb {
            min: Vec3::new(-1.0, -2.0, -3.0),
            max: Vec3::new(4.0, 5.0, 6.0),
        };
        let mut buf = Vec::new();
        bounds.serialize(&mut buf).unwrap();
        assert_eq!(24, buf.len());
        assert_eq!(bounds, Aabb::deserialize(&mut Cursor::new(buf)).unwrap());
    }
}
