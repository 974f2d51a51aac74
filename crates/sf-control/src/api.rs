//! Remote-host seam
//!
//! [`LiveApi`] is the boundary between the control layer and the live host.
//! Production traffic goes through [`LiveHost`], which maps each call onto
//! the host's OSC address family; tests drive the same trait with in-memory
//! fakes.

use std::time::Duration;

use sf_osc::{last_numeric, OscClient, OscType, RetryPolicy, SetOutcome};

use crate::error::{ControlError, ControlResult};

/// Operations the control layer needs from the live host.
///
/// Implementations must be shareable across caller threads.
pub trait LiveApi: Send + Sync {
    fn track_count(&self) -> ControlResult<usize>;
    fn device_count(&self, track: usize) -> ControlResult<usize>;
    fn device_names(&self, track: usize) -> ControlResult<Vec<String>>;
    fn parameter_names(&self, track: usize, device: usize) -> ControlResult<Vec<String>>;
    fn parameter_ranges(&self, track: usize, device: usize)
        -> ControlResult<(Vec<f32>, Vec<f32>)>;
    /// Current normalized value; `None` when the host did not answer.
    fn parameter_value(&self, track: usize, device: usize, param: usize)
        -> ControlResult<Option<f32>>;
    /// Write a normalized value, optionally confirming it via readback.
    fn set_parameter(
        &self,
        track: usize,
        device: usize,
        param: usize,
        normalized: f32,
        verify: bool,
    ) -> ControlResult<SetOutcome>;
    /// Request instantiation; completion is asynchronous on the host side.
    fn load_device(&self, track: usize, name: &str, position: i32) -> ControlResult<()>;
    fn delete_device(&self, track: usize, device: usize) -> ControlResult<()>;
    fn set_device_enabled(&self, track: usize, device: usize, enabled: bool) -> ControlResult<()>;
    /// Cheap no-op read used as a liveness probe during recovery.
    fn probe(&self) -> ControlResult<()>;
}

/// [`LiveApi`] over a real OSC link.
pub struct LiveHost {
    client: OscClient,
    policy: RetryPolicy,
    query_timeout: Duration,
}

impl LiveHost {
    pub fn new(client: OscClient) -> Self {
        let policy = RetryPolicy::default();
        let query_timeout = Duration::from_millis(policy.timeout_ms);
        Self {
            client,
            policy,
            query_timeout,
        }
    }

    /// Override the verify retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.query_timeout = Duration::from_millis(policy.timeout_ms);
        self.policy = policy;
        self
    }

    pub fn client(&self) -> &OscClient {
        &self.client
    }

    fn query_numeric(&self, addr: &str, args: Vec<OscType>) -> ControlResult<f32> {
        let reply = self.client.query(addr, args, self.query_timeout)?;
        reply
            .and_then(|(_, args)| last_numeric(&args))
            .ok_or_else(|| ControlError::NoReply(addr.to_string()))
    }

    /// Collect the string arguments of a reply, skipping the echoed numeric
    /// address prefix (`[track, device, name, name, ...]`).
    fn query_strings(&self, addr: &str, args: Vec<OscType>) -> ControlResult<Vec<String>> {
        let reply = self.client.query(addr, args, self.query_timeout)?;
        let (_, args) = reply.ok_or_else(|| ControlError::NoReply(addr.to_string()))?;
        Ok(args
            .into_iter()
            .filter_map(|a| match a {
                OscType::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }

    /// Collect the float arguments of a reply, skipping the echoed integer
    /// address prefix.
    fn query_floats(&self, addr: &str, args: Vec<OscType>) -> ControlResult<Vec<f32>> {
        let reply = self.client.query(addr, args, self.query_timeout)?;
        let (_, args) = reply.ok_or_else(|| ControlError::NoReply(addr.to_string()))?;
        Ok(args
            .into_iter()
            .filter_map(|a| match a {
                OscType::Float(f) => Some(f),
                OscType::Double(d) => Some(d as f32),
                _ => None,
            })
            .collect())
    }
}

impl LiveApi for LiveHost {
    fn track_count(&self) -> ControlResult<usize> {
        let n = self.query_numeric("/live/song/get/num_tracks", vec![])?;
        Ok(n.max(0.0) as usize)
    }

    fn device_count(&self, track: usize) -> ControlResult<usize> {
        let n = self.query_numeric(
            "/live/track/get/num_devices",
            vec![OscType::Int(track as i32)],
        )?;
        Ok(n.max(0.0) as usize)
    }

    fn device_names(&self, track: usize) -> ControlResult<Vec<String>> {
        self.query_strings(
            "/live/track/get/devices/name",
            vec![OscType::Int(track as i32)],
        )
    }

    fn parameter_names(&self, track: usize, device: usize) -> ControlResult<Vec<String>> {
        self.query_strings(
            "/live/device/get/parameters/name",
            vec![OscType::Int(track as i32), OscType::Int(device as i32)],
        )
    }

    fn parameter_ranges(
        &self,
        track: usize,
        device: usize,
    ) -> ControlResult<(Vec<f32>, Vec<f32>)> {
        let args = vec![OscType::Int(track as i32), OscType::Int(device as i32)];
        let mins = self.query_floats("/live/device/get/parameters/min", args.clone())?;
        let maxs = self.query_floats("/live/device/get/parameters/max", args)?;
        Ok((mins, maxs))
    }

    fn parameter_value(
        &self,
        track: usize,
        device: usize,
        param: usize,
    ) -> ControlResult<Option<f32>> {
        let reply = self.client.query(
            "/live/device/get/parameter/value",
            vec![
                OscType::Int(track as i32),
                OscType::Int(device as i32),
                OscType::Int(param as i32),
            ],
            self.query_timeout,
        )?;
        Ok(reply.and_then(|(_, args)| last_numeric(&args)))
    }

    fn set_parameter(
        &self,
        track: usize,
        device: usize,
        param: usize,
        normalized: f32,
        verify: bool,
    ) -> ControlResult<SetOutcome> {
        let prefix = vec![
            OscType::Int(track as i32),
            OscType::Int(device as i32),
            OscType::Int(param as i32),
        ];
        let mut set_args = prefix.clone();
        set_args.push(OscType::Float(normalized));

        if !verify {
            return Ok(self
                .client
                .set("/live/device/set/parameter/value", set_args)?);
        }
        Ok(self.client.verified_set(
            "/live/device/set/parameter/value",
            set_args,
            "/live/device/get/parameter/value",
            prefix,
            OscType::Float(normalized),
            &self.policy,
        )?)
    }

    fn load_device(&self, track: usize, name: &str, position: i32) -> ControlResult<()> {
        Ok(self.client.load_device(track, name, position)?)
    }

    fn delete_device(&self, track: usize, device: usize) -> ControlResult<()> {
        Ok(self.client.delete_device(track, device)?)
    }

    fn set_device_enabled(&self, track: usize, device: usize, enabled: bool) -> ControlResult<()> {
        self.client.send(
            "/live/device/set/enabled",
            vec![
                OscType::Int(track as i32),
                OscType::Int(device as i32),
                OscType::Int(enabled as i32),
            ],
        )?;
        Ok(())
    }

    fn probe(&self) -> ControlResult<()> {
        self.query_numeric("/live/song/get/tempo", vec![])?;
        Ok(())
    }
}
