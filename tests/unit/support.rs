//! Fixtures shared by unit tests.
#![allow(dead_code)]

#[path = "../support/anim_builder.rs"]
pub mod anim_builder;
#[path = "../support/gif_builder.rs"]
pub mod gif_builder;
#[path = "../support/scripted.rs"]
pub mod scripted;

pub mod api {
    pub use crate::foundation::core::{
        BlendOperation, CanvasSize, DisposeMethod, FrameRect,
    };
    pub use crate::foundation::error::{LoopframeError, LoopframeResult};
    pub use crate::source::{
        ContainerHeader, ContainerScan, FrameRecord, FrameSource, ImageType, RawFrame,
    };
}
