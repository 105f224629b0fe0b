// SPDX-License-Identifier: MIT

pub mod capability;
pub mod error;
pub mod model;
