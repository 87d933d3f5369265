// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The command layer: one submodule per wire command (spec.md §6),
//! wired together by `registry`.

pub mod convert;
pub mod registry;

mod cd;
mod date;
mod exit;
mod get;
mod grep;
mod login;
mod logout;
mod ls;
mod mkdir;
mod pass;
mod ping;
mod put;
mod rm;
mod w;
mod whoami;

pub use registry::{create, ArgKind, Command, ExecCtx, MiddlewareKind};
