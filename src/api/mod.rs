// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod echo;
pub mod errors;
pub mod http_client;
pub mod http_server;

pub use echo::{EchoRequest, EchoResponse, ECHO_PATH};
pub use errors::ApiError;
pub use http_client::HttpTransport;
pub use http_server::{router, start_server, AppState};
