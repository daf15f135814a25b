//! Device session: negotiation, capture lifecycle, frame access
//!
//! A `Device` binds a fixed capability table to a set of transport
//! endpoints. The application enables streams, configures them, starts
//! capture, and then reads frames through the synchronous accessors while
//! endpoint producer threads publish into per-stream triple buffers.

pub mod caps;
pub mod controls;
mod negotiate;

use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::error::DeviceError;
use crate::stream::mode::{PixelFormat, Preset, StreamKind, StreamMode, StreamRequest};
use crate::stream::session::StreamSession;
use crate::stream::triple::{DeliveryStats, FrameWriter};
use crate::transport::{Endpoint, EndpointMode, FrameSink};

use caps::{DeviceInfo, Intrinsics};
use controls::{Controls, DeviceOption};

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-stream wiring handed to an endpoint's frame sink
struct Binding {
    writer: FrameWriter,
    next_number: u64,
}

/// One endpoint's start plan: its raw mode and the streams it feeds
struct EndpointPlan {
    endpoint: usize,
    raw: EndpointMode,
    bindings: Vec<Binding>,
}

pub struct Device {
    info: DeviceInfo,
    endpoints: Vec<Box<dyn Endpoint>>,
    controls: Box<dyn Controls>,
    requests: [StreamRequest; StreamKind::COUNT],
    sessions: [Option<StreamSession>; StreamKind::COUNT],
    /// Endpoints streaming right now, in start order
    active: Vec<usize>,
    /// True iff `configure_enabled_streams` has run since the last request
    /// change; sessions are only trusted while this holds
    configured: bool,
    capturing: bool,
    wait_timeout: Duration,
}

impl Device {
    pub fn new(
        info: DeviceInfo,
        endpoints: Vec<Box<dyn Endpoint>>,
        controls: Box<dyn Controls>,
    ) -> Self {
        Self {
            info,
            endpoints,
            controls,
            requests: [StreamRequest::default(); StreamKind::COUNT],
            sessions: std::array::from_fn(|_| None),
            active: Vec::new(),
            configured: false,
            capturing: false,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn depth_scale(&self) -> f32 {
        self.info.depth_scale()
    }

    pub fn supports_option(&self, option: DeviceOption) -> bool {
        self.info.supports_option(option)
    }

    /// Bound on `wait_all_streams`; the default is 5 seconds
    pub fn set_wait_timeout(&mut self, timeout: Duration) {
        self.wait_timeout = timeout;
    }

    /// Record a request for one stream kind. Zero width/height/fps and
    /// `PixelFormat::Any` are wildcards. Fails immediately when no
    /// capability entry matches; does not touch hardware.
    #[instrument(skip(self))]
    pub fn enable_stream(
        &mut self,
        kind: StreamKind,
        width: u32,
        height: u32,
        format: PixelFormat,
        fps: u32,
    ) -> Result<(), DeviceError> {
        if self.capturing {
            return Err(DeviceError::State(
                "cannot change stream requests while capturing",
            ));
        }
        let mut request = StreamRequest {
            enabled: true,
            width,
            height,
            format,
            fps,
            mode: None,
        };
        let entry = negotiate::select_mode(&self.info, kind, &request)?;
        request.mode = Some(entry.mode);
        self.requests[kind.index()] = request;
        self.sessions[kind.index()] = None;
        self.configured = false;
        Ok(())
    }

    /// Resolve a named preset to a canonical request, then record it
    #[instrument(skip(self))]
    pub fn enable_stream_preset(
        &mut self,
        kind: StreamKind,
        preset: Preset,
    ) -> Result<(), DeviceError> {
        if self.capturing {
            return Err(DeviceError::State(
                "cannot change stream requests while capturing",
            ));
        }
        let entry = negotiate::select_preset(&self.info, kind, preset)?;
        let mode = entry.mode;
        self.requests[kind.index()] = StreamRequest {
            enabled: true,
            width: mode.width,
            height: mode.height,
            format: mode.format,
            fps: mode.fps,
            mode: Some(mode),
        };
        self.sessions[kind.index()] = None;
        self.configured = false;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn disable_stream(&mut self, kind: StreamKind) -> Result<(), DeviceError> {
        if self.capturing {
            return Err(DeviceError::State(
                "cannot change stream requests while capturing",
            ));
        }
        self.requests[kind.index()] = StreamRequest::default();
        self.sessions[kind.index()] = None;
        self.configured = false;
        Ok(())
    }

    pub fn is_stream_enabled(&self, kind: StreamKind) -> bool {
        self.requests[kind.index()].enabled
    }

    /// The descriptor resolved for an enabled stream
    pub fn get_stream_mode(&self, kind: StreamKind) -> Result<StreamMode, DeviceError> {
        let request = &self.requests[kind.index()];
        if !request.enabled {
            return Err(DeviceError::State("stream not enabled"));
        }
        request.mode.ok_or(DeviceError::State("stream not enabled"))
    }

    pub fn get_stream_intrinsics(&self, kind: StreamKind) -> Result<Intrinsics, DeviceError> {
        let mode = self.get_stream_mode(kind)?;
        self.info
            .intrinsics(mode.intrinsics_index)
            .copied()
            .ok_or_else(|| {
                DeviceError::Configuration(format!(
                    "intrinsics index {} is not in the device table",
                    mode.intrinsics_index
                ))
            })
    }

    pub fn get_stream_format(&self, kind: StreamKind) -> Result<PixelFormat, DeviceError> {
        Ok(self.get_stream_mode(kind)?.format)
    }

    pub fn get_stream_framerate(&self, kind: StreamKind) -> Result<u32, DeviceError> {
        Ok(self.get_stream_mode(kind)?.fps)
    }

    /// Build a session and triple buffer for every enabled request and map
    /// each to its producing sub-endpoint. Must run after the last
    /// `enable_stream*` call and before `start_capture`.
    #[instrument(skip(self))]
    pub fn configure_enabled_streams(&mut self) -> Result<(), DeviceError> {
        if self.capturing {
            return Err(DeviceError::State(
                "cannot reconfigure streams while capturing",
            ));
        }

        self.configured = false;

        let mut planned: Vec<caps::ModeEntry> = Vec::new();
        for kind in StreamKind::ALL {
            let request = self.requests[kind.index()];
            if !request.enabled {
                self.sessions[kind.index()] = None;
                continue;
            }
            // deterministic re-resolution of the request validated at
            // enable time, now carrying the endpoint mapping
            let entry = negotiate::select_mode(&self.info, kind, &request)?;
            if entry.endpoint >= self.endpoints.len() {
                return Err(DeviceError::Configuration(format!(
                    "capability table references unknown endpoint {}",
                    entry.endpoint
                )));
            }
            planned.push(entry);
        }

        // streams may share a sub-endpoint only when their raw capture
        // parameters agree
        for (i, a) in planned.iter().enumerate() {
            for b in &planned[i + 1..] {
                if a.endpoint == b.endpoint
                    && EndpointMode::from(a.mode) != EndpointMode::from(b.mode)
                {
                    return Err(DeviceError::Configuration(format!(
                        "streams {} and {} require conflicting modes on endpoint {}",
                        a.kind, b.kind, a.endpoint
                    )));
                }
            }
        }

        for entry in &planned {
            self.sessions[entry.kind.index()] =
                Some(StreamSession::new(entry.kind, entry.mode, entry.endpoint));
        }

        self.configured = true;
        info!(streams = planned.len(), "configured enabled streams");
        Ok(())
    }

    /// Open every mapped sub-endpoint, register its frame sink and begin
    /// streaming. All-or-nothing: on partial failure every endpoint already
    /// started is stopped again and the error propagates.
    #[instrument(skip(self))]
    pub fn start_capture(&mut self) -> Result<(), DeviceError> {
        if self.capturing {
            return Err(DeviceError::State("capture already started"));
        }
        if !self.requests.iter().any(|request| request.enabled) {
            return Err(DeviceError::State("no streams enabled"));
        }
        if !self.configured {
            return Err(DeviceError::State(
                "stream requests changed; run configure_enabled_streams first",
            ));
        }

        let enabled: Vec<StreamKind> = StreamKind::ALL
            .into_iter()
            .filter(|kind| self.requests[kind.index()].enabled)
            .collect();
        self.controls
            .set_stream_intent(&enabled)
            .map_err(|source| DeviceError::Hardware {
                context: "control plane".into(),
                source,
            })?;

        let mut plans: Vec<EndpointPlan> = Vec::new();
        for session in self.sessions.iter().flatten() {
            let binding = Binding {
                writer: session.buffer().writer(),
                next_number: 0,
            };
            match plans
                .iter_mut()
                .find(|plan| plan.endpoint == session.endpoint())
            {
                Some(plan) => plan.bindings.push(binding),
                None => plans.push(EndpointPlan {
                    endpoint: session.endpoint(),
                    raw: EndpointMode::from(session.mode()),
                    bindings: vec![binding],
                }),
            }
        }

        let mut started: Vec<usize> = Vec::new();
        for plan in plans {
            let sink = Self::sink_for(plan.bindings);
            let endpoint = &mut self.endpoints[plan.endpoint];

            if let Err(source) = endpoint.open() {
                self.rollback(&started);
                return Err(DeviceError::Hardware {
                    context: format!("endpoint {}", plan.endpoint),
                    source,
                });
            }
            if let Err(source) = endpoint.start_streaming(plan.raw, sink) {
                let _ = endpoint.close();
                self.rollback(&started);
                return Err(DeviceError::Hardware {
                    context: format!("endpoint {}", plan.endpoint),
                    source,
                });
            }
            started.push(plan.endpoint);
        }

        self.active = started;
        self.capturing = true;
        info!(endpoints = self.active.len(), "capture started");
        Ok(())
    }

    /// Stop and close every streaming sub-endpoint, quiescing all producer
    /// callbacks before returning. A no-op when already idle. Buffered
    /// frames stay readable until streams are disabled or reconfigured.
    #[instrument(skip(self))]
    pub fn stop_capture(&mut self) -> Result<(), DeviceError> {
        if !self.capturing {
            return Ok(());
        }

        let mut first_error: Option<DeviceError> = None;
        for index in std::mem::take(&mut self.active) {
            let endpoint = &mut self.endpoints[index];
            for result in [endpoint.stop_streaming(), endpoint.close()] {
                if let Err(source) = result {
                    warn!(endpoint = index, error = %source, "endpoint teardown failed");
                    first_error.get_or_insert(DeviceError::Hardware {
                        context: format!("endpoint {index}"),
                        source,
                    });
                }
            }
        }

        self.capturing = false;
        info!("capture stopped");
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Block until every enabled stream has published at least one frame
    /// not yet seen by the consumer. A polling barrier: frame arrival
    /// timing differs across stream kinds, so no single producer could
    /// signal readiness for all of them.
    pub fn wait_all_streams(&mut self) -> Result<(), DeviceError> {
        if !self.capturing {
            return Err(DeviceError::State("not capturing"));
        }

        let started = Instant::now();
        let mut pending = [false; StreamKind::COUNT];
        for session in self.sessions.iter().flatten() {
            pending[session.kind().index()] = true;
        }

        loop {
            let mut remaining = false;
            for (index, slot) in self.sessions.iter_mut().enumerate() {
                let Some(session) = slot else { continue };
                if !pending[index] {
                    continue;
                }
                if session.buffer_mut().update_image() {
                    pending[index] = false;
                } else {
                    remaining = true;
                }
            }
            if !remaining {
                break;
            }
            if started.elapsed() >= self.wait_timeout {
                return Err(DeviceError::Timeout(self.wait_timeout));
            }
            thread::yield_now();
        }

        metrics::histogram!("wait_all_streams_us").record(started.elapsed().as_micros() as f64);
        Ok(())
    }

    /// One non-blocking refresh pass over all enabled streams; returns true
    /// if any stream adopted a new frame
    pub fn poll_all_streams(&mut self) -> Result<bool, DeviceError> {
        if !self.capturing {
            return Err(DeviceError::State("not capturing"));
        }
        let mut any = false;
        for session in self.sessions.iter_mut().flatten() {
            any |= session.buffer_mut().update_image();
        }
        Ok(any)
    }

    /// Sequence number of the stream's last adopted frame
    pub fn get_image_frame_number(&self, kind: StreamKind) -> Result<u64, DeviceError> {
        Ok(self.session(kind)?.buffer().frame_number())
    }

    /// Pixels of the stream's last adopted frame
    pub fn get_image_pixels(&self, kind: StreamKind) -> Result<&[u8], DeviceError> {
        Ok(self.session(kind)?.buffer().pixels())
    }

    pub fn delivery_stats(&self, kind: StreamKind) -> Result<DeliveryStats, DeviceError> {
        Ok(self.session(kind)?.buffer().stats())
    }

    pub fn set_option(&mut self, option: DeviceOption, value: i32) -> Result<(), DeviceError> {
        if !self.info.supports_option(option) {
            return Err(DeviceError::Configuration(format!(
                "option {option:?} is not supported by this device"
            )));
        }
        self.controls
            .set_option(option, value)
            .map_err(|source| DeviceError::Hardware {
                context: "control plane".into(),
                source,
            })
    }

    pub fn get_option(&self, option: DeviceOption) -> Result<i32, DeviceError> {
        if !self.info.supports_option(option) {
            return Err(DeviceError::Configuration(format!(
                "option {option:?} is not supported by this device"
            )));
        }
        self.controls
            .get_option(option)
            .map_err(|source| DeviceError::Hardware {
                context: "control plane".into(),
                source,
            })
    }

    fn session(&self, kind: StreamKind) -> Result<&StreamSession, DeviceError> {
        self.sessions[kind.index()]
            .as_ref()
            .ok_or(DeviceError::State("stream not enabled"))
    }

    /// Fan-out sink for one endpoint: copy the raw frame into each bound
    /// stream's back slot and publish. Runs on the endpoint's producer
    /// thread; the only synchronization inside is the per-buffer swap.
    fn sink_for(mut bindings: Vec<Binding>) -> FrameSink {
        Box::new(move |data: &[u8]| {
            for binding in &mut bindings {
                binding.next_number += 1;
                let back = binding.writer.back_pixels();
                let len = back.len().min(data.len());
                back[..len].copy_from_slice(&data[..len]);
                binding.writer.set_back_number(binding.next_number);
                binding.writer.publish();
            }
        })
    }

    fn rollback(&mut self, started: &[usize]) {
        for &index in started {
            let endpoint = &mut self.endpoints[index];
            if let Err(error) = endpoint.stop_streaming() {
                warn!(endpoint = index, %error, "rollback stop failed");
            }
            if let Err(error) = endpoint.close() {
                warn!(endpoint = index, %error, "rollback close failed");
            }
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.capturing {
            if let Err(error) = self.stop_capture() {
                warn!(%error, "capture teardown failed on drop");
            }
        }
    }
}
