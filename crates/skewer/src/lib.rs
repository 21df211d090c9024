//! # Skewer
//!
//! Ticketed batch assembly for per-object inference preprocessing.
//!
//! ## Overview
//!
//! Secondary inference runs a model on every object detected in a frame.
//! Objects arrive one at a time, from many streams, in arbitrary order; the
//! model wants fixed-size batches. This crate assembles those batches
//! directly in reusable input buffers, so every object is written exactly
//! once, at its final position, while earlier batches are still being
//! consumed.
//!
//! Key components include:
//!
//! - A bounded pool of reusable batch slots with a ticketing protocol
//! - Batching stages that assign each object its batch offset and slot
//! - Deferred tasks that do the actual write once the slot is available
//! - A reference executor running those tasks with bounded concurrency
//!
//! ## Architecture
//!
//! ### Slot pool
//!
//! [`resource::SlotPool`] hands out tickets in arrival order without ever
//! waiting. Only redeeming a ticket suspends, until the slot it names has
//! been released by the previous batch. Completed batches are delivered on a
//! [`resource::FilledSlots`] stream and the slot is reused once the consumer
//! drops it.
//!
//! ### Stages
//!
//! The [`stage::ObjBatchingStage`] trait is implemented by three variants:
//!
//! - [`stage::CpuPreprocessingStage`] writes host buffers through a
//!   [`backend::ObjPreproc`]
//! - [`stage::ScalerStage`] writes device buffers through a stateless
//!   [`backend::ImageTransform`]
//! - [`stage::ResizeConvertStage`] feeds stateful [`backend::ResizeConvertOp`]s
//!   synchronously
//!
//! ### Assumptions
//!
//! - Buffers are NHWC; the batch dimension is the outermost one
//! - Bounding boxes are normalized to the frame size but may lie outside it
//! - Device capabilities are provided by the caller; this crate never talks
//!   to an accelerator itself
//!
//! ## Example
//!
//! ```ignore
//! let (stage, mut batches) = CpuPreprocessingStage::with_host_buffers(model, preproc, &config)?;
//! let executor = TaskExecutor::new(config.max_concurrent_tasks)?;
//!
//! tokio::spawn(async move {
//!     while let Some(batch) = batches.next().await {
//!         infer(batch.value(), batch.objects()).await;
//!     }
//! });
//!
//! for (frame, obj) in detections {
//!     executor.submit(stage.submit(frame, obj));
//! }
//! stage.flush_pending();
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod frame;
pub mod model;
pub mod resource;
pub mod stage;
pub mod task;

pub use config::StageConfig;
pub use error::{BatchingError, ErrorKind, Result};
pub use executor::{TaskExecutor, TaskOutcome};
pub use task::{InferTask, ReadyTask};
