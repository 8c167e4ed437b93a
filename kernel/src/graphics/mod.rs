//! Framebuffer graphics and the text console.

pub mod fbcon;
pub mod font8x8;
pub mod framebuffer;

pub use fbcon::Console;
pub use framebuffer::Framebuffer;
