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

/// Scene description kept as raw text, null-terminated for consumers that
/// hand it to C-side parsers.
#[derive(Debug, Clone, Default)]
pub struct SceneAsset {
    pub text: Vec<u8>,
}

impl SceneAsset {
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        bytes.push(0);
        Self { text: bytes }
    }

    pub fn as_str(&self) -> &str {
        let end = self.text.len().saturating_sub(1);
        std::str::from_utf8(&self.text[..end]).unwrap_or("")
    }
}

#[cfg(test)]
mod test {
    use crate::SceneAsset;

    #[test]
    fn trailing_nul() {
        let scene = SceneAsset::from_bytes(b"nodes: []".to_vec());
        assert_eq!(Some(&0u8), scene.text.last());
        assert_eq!("nodes: []", scene.as_str());
    }

    #[test]
    fn empty_scene() {
        let scene = SceneAsset::from_bytes(Vec::new());
        assert_eq!(vec![0u8], scene.text);
        assert_eq!("", scene.as_str());
    }
}
