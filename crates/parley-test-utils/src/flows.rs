//! Reusable flow logic for tests.
//!
//! Initiators take the peer they talk to; responders take the session they
//! were accepted on.

use async_trait::async_trait;
use std::time::Duration;

use parley_core::{FlowContext, FlowError, FlowLogic, FlowSession, Payload, PeerId};

/// Initiator: sends `"PING"` and returns the reply
pub struct Ping {
    counterparty: PeerId,
}

impl Ping {
    /// Ping `counterparty`
    pub fn new(counterparty: impl Into<PeerId>) -> Self {
        Self {
            counterparty: counterparty.into(),
        }
    }
}

#[async_trait]
impl FlowLogic for Ping {
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Payload, FlowError> {
        let mut session = ctx.initiate_flow(&self.counterparty)?;
        let reply: String = ctx.send_and_receive(&mut session, "PING").await?;
        Ok(Payload::encode(&reply)?)
    }
}

/// Responder: receives one string and answers with a fixed reply
pub struct Reply {
    session: FlowSession,
    reply: &'static str,
}

impl Reply {
    /// Answer on `session` with `reply`
    pub fn new(session: FlowSession, reply: &'static str) -> Self {
        Self { session, reply }
    }
}

#[async_trait]
impl FlowLogic for Reply {
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Payload, FlowError> {
        let request: String = ctx.receive(&mut self.session).await?;
        ctx.send(&self.session, self.reply)?;
        Ok(Payload::encode(&request)?)
    }
}

/// Initiator: sends `0..count` then collects the echoes
pub struct Counter {
    counterparty: PeerId,
    count: i64,
}

impl Counter {
    /// Count to `count` with `counterparty`
    pub fn new(counterparty: impl Into<PeerId>, count: i64) -> Self {
        Self {
            counterparty: counterparty.into(),
            count,
        }
    }
}

#[async_trait]
impl FlowLogic for Counter {
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Payload, FlowError> {
        let mut session = ctx.initiate_flow(&self.counterparty)?;
        for i in 0..self.count {
            ctx.send(&session, &i)?;
        }

        let mut echoed = Vec::with_capacity(self.count as usize);
        for _ in 0..self.count {
            echoed.push(ctx.receive::<i64>(&mut session).await?);
        }
        Ok(Payload::encode(&echoed)?)
    }
}

/// Responder: echoes every value until the initiator goes away
pub struct Echo {
    session: FlowSession,
}

impl Echo {
    /// Echo on `session`
    pub fn new(session: FlowSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl FlowLogic for Echo {
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Payload, FlowError> {
        let mut echoed = 0u64;
        loop {
            match ctx.receive::<serde_json::Value>(&mut self.session).await {
                Ok(value) => {
                    ctx.send(&self.session, &value)?;
                    echoed += 1;
                }
                Err(FlowError::SessionClosed { .. }) => return Ok(Payload::encode(&echoed)?),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Responder: receives one value and fails
pub struct Failing {
    session: FlowSession,
    message: &'static str,
}

impl Failing {
    /// Fail on `session` with `message`
    pub fn new(session: FlowSession, message: &'static str) -> Self {
        Self { session, message }
    }
}

#[async_trait]
impl FlowLogic for Failing {
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Payload, FlowError> {
        let _: serde_json::Value = ctx.receive(&mut self.session).await?;
        Err(FlowError::application(self.message))
    }
}

/// Responder: answers a string request with a number
pub struct WrongType {
    session: FlowSession,
}

impl WrongType {
    /// Misbehave on `session`
    pub fn new(session: FlowSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl FlowLogic for WrongType {
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Payload, FlowError> {
        let _: String = ctx.receive(&mut self.session).await?;
        ctx.send(&self.session, &42)?;
        Ok(Payload::unit())
    }
}

/// Responder: never answers, waits for the session to end
pub struct Silent {
    session: FlowSession,
}

impl Silent {
    /// Stay silent on `session`
    pub fn new(session: FlowSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl FlowLogic for Silent {
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Payload, FlowError> {
        loop {
            let _: serde_json::Value = ctx.receive(&mut self.session).await?;
        }
    }
}

/// Initiator: sleeps, then returns unit
pub struct Sleeper {
    duration: Duration,
}

impl Sleeper {
    /// Sleep for `duration`
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl FlowLogic for Sleeper {
    async fn call(&mut self, _ctx: &mut FlowContext) -> Result<Payload, FlowError> {
        tokio::time::sleep(self.duration).await;
        Ok(Payload::unit())
    }
}
