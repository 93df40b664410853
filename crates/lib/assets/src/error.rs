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

use std::io;

use kyanite_backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("rejected input: {0}")]
    Rejected(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("capacity exhausted: {0}")]
    Capacity(&'static str),
    #[error("manager is shutting down")]
    ShuttingDown,
    #[error("device init failed: {0}")]
    Init(#[from] BackendError),
    #[error("corrupt container: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}
