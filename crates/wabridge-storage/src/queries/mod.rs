// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the storage tables.

pub mod cursors;
pub mod dedup;
pub mod deliveries;
pub mod media_jobs;
