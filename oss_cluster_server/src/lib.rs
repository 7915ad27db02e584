// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! HTTP front-end of the [oss_cluster] registry.
//!
//! Every process serves the health-check endpoint. Masters additionally serve the
//! registry API, once their [oss_cluster::ClusterManager] is installed in the
//! shared [AppState].

#![warn(unused_imports)]
#![warn(unsafe_code)]
#![warn(missing_docs)]

pub mod http;

pub use http::{router, ApiError, AppState};
