//! Core types for the MOOD catalog.
//!
//! This module provides type-safe wrappers for catalog concepts.

pub mod house;
pub mod id;
pub mod image;

pub use house::{AddOnModuleRecord, HouseRecord, HouseType, SizeClass};
pub use id::HouseId;
pub use image::{ImageView, image_path};
