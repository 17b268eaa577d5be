// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Scenario tests exercising the Job Runner end to end through its public
//! API, with a scripted `FakeAgent` and a real `numerus-store` WAL on a
//! temp directory standing in for everything a `numerusd` process wires
//! together at startup.

mod support;

mod job;
