//! Foundation module - Core utilities and types
//!
//! This module provides the building blocks shared by the batching layers:
//! - Math types (transforms, rects, bounding boxes)
//! - Arena keys and reusable object pools
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod logging;
