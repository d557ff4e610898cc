#![no_std]
#![forbid(unsafe_code)]

//! # HD Memory
//!
//! DMA descriptor layout, chain linking and the descriptor memory that the
//! slave engine draws its TX and RX chains from. Memory is handed out as
//! fixed blocks of descriptors; nothing is allocated after initialization.

pub mod desc;
pub mod pool;

pub use desc::*;
pub use pool::*;
