//! Real-time audio and event bridge.
//!
//! The host side is a mono `f32` stream. Each render copies the input into
//! every channel of the plugin's main input port, hands queued events to
//! `process` and folds the main output port back to mono. Buffers and event
//! storage are sized at load so the render path never allocates.

use std::ptr;

use clap_sys::audio_buffer::clap_audio_buffer;
use clap_sys::process::clap_process;
use tracing::{debug, error};

use crate::config::{Downmix, HostConfig};
use crate::events::{
    rebase_into, with_input_events, with_output_events, ClapEvent, EventQueue, NoteKind,
    OutputEvent, OutputEvents, Segments,
};
use crate::instance::{PluginInstance, ProcessStatus};
use crate::params::ParameterSync;
use crate::voices::{NoteEndEvents, VoiceTracker};

/// Channels per port the bridge will drive.
pub const MAX_CHANNELS: usize = 8;

/// Port layout negotiated at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PortLayout {
    pub inputs: usize,
    pub outputs: usize,
}

impl PortLayout {
    /// Resolve the layout from audio-port queries.
    ///
    /// Without the extension an effect gets stereo in and out and an
    /// instrument gets stereo out only.
    pub(crate) fn resolve(inputs: Option<usize>, outputs: Option<usize>, is_instrument: bool) -> Self {
        let default_inputs = if is_instrument { 0 } else { 2 };
        Self {
            inputs: inputs.unwrap_or(default_inputs).min(MAX_CHANNELS),
            outputs: outputs.unwrap_or(2).min(MAX_CHANNELS),
        }
    }
}

pub(crate) struct AudioBridge {
    max_frames: usize,
    downmix: Downmix,
    split_at_events: bool,
    is_instrument: bool,
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
    queue: EventQueue,
    scratch: Vec<ClapEvent>,
    out_events: OutputEvents,
    voices: Option<VoiceTracker>,
    steady_time: i64,
    error_reported: bool,
}

impl AudioBridge {
    pub(crate) fn new(
        config: &HostConfig,
        layout: PortLayout,
        is_instrument: bool,
        param_count: usize,
        note_ends: NoteEndEvents,
    ) -> Self {
        let max_frames = config.max_frames.max(1) as usize;
        let queue_len = config.event_capacity + param_count;
        Self {
            max_frames,
            downmix: config.downmix,
            split_at_events: config.split_at_events,
            is_instrument,
            inputs: vec![vec![0.0; max_frames]; layout.inputs],
            outputs: vec![vec![0.0; max_frames]; layout.outputs],
            queue: EventQueue::new(config.event_capacity, param_count),
            scratch: Vec::with_capacity(queue_len),
            out_events: OutputEvents::new(config.event_capacity.max(param_count) + config.max_voices),
            voices: is_instrument.then(|| VoiceTracker::new(config.max_voices, note_ends)),
            steady_time: 0,
            error_reported: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn steady_time(&self) -> i64 {
        self.steady_time
    }

    #[cfg(test)]
    pub(crate) fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Render without the plugin: copy input to output and retire this
    /// quantum's events so nothing queued while bypassed reaches it later.
    pub(crate) fn pass_through(&mut self, input: &[f32], output: &mut [f32]) {
        copy_through(input, output);
        self.queue.clear();
        if let Some(voices) = self.voices.as_mut() {
            voices.collect_released();
        }
    }

    /// Drop queued events and forget voices after the plugin was reset.
    pub(crate) fn reset(&mut self) {
        self.queue.clear();
        if let Some(voices) = self.voices.as_mut() {
            voices.clear();
        }
        self.error_reported = false;
    }

    pub(crate) fn voice_count(&self) -> usize {
        self.voices.as_ref().map_or(0, VoiceTracker::len)
    }

    pub(crate) fn held_voice_count(&self) -> usize {
        self.voices.as_ref().map_or(0, VoiceTracker::held)
    }

    // ── Note events ──

    /// Queue a note-on; `false` when the queue has no room.
    pub(crate) fn note_on(&mut self, channel: i16, key: i16, velocity: f64, time: u32) -> bool {
        let Some(voices) = self.voices.as_mut() else {
            return false;
        };
        if self.queue.remaining() < 2 {
            debug!(key, "event queue full, note-on dropped");
            return false;
        }
        let (note_id, evicted) = voices.note_on(channel, key);
        if let Some(end) = evicted {
            debug!(note_id = end.note_id, "voice limit reached, choking oldest voice");
            self.queue.push(ClapEvent::note(
                NoteKind::Choke,
                time,
                end.note_id,
                end.channel,
                end.key,
                0.0,
            ));
        }
        self.queue
            .push(ClapEvent::note(NoteKind::On, time, note_id, channel, key, velocity))
    }

    pub(crate) fn note_off(&mut self, channel: i16, key: i16, velocity: f64, time: u32) -> bool {
        let Some(voices) = self.voices.as_mut() else {
            return false;
        };
        if self.queue.remaining() == 0 {
            return false;
        }
        // Unknown notes still go out, addressed by key.
        let note_id = voices.note_off(channel, key).unwrap_or(-1);
        self.queue
            .push(ClapEvent::note(NoteKind::Off, time, note_id, channel, key, velocity))
    }

    pub(crate) fn choke(&mut self, channel: i16, key: i16, time: u32) -> bool {
        let Some(voices) = self.voices.as_mut() else {
            return false;
        };
        if self.queue.remaining() == 0 {
            return false;
        }
        voices.choke(channel, key);
        self.queue
            .push(ClapEvent::note(NoteKind::Choke, time, -1, channel, key, 0.0))
    }

    // ── Rendering ──

    /// Render `input` through the plugin into `output`.
    ///
    /// Processes `min(input.len(), output.len())` frames and zeroes any
    /// remaining output. Queued events are consumed exactly once.
    pub(crate) fn render(
        &mut self,
        instance: &mut PluginInstance,
        params: &ParameterSync,
        input: &[f32],
        output: &mut [f32],
    ) {
        if !instance.state().is_processing() {
            self.pass_through(input, output);
            return;
        }
        let frames = input.len().min(output.len());
        output[frames..].fill(0.0);
        if frames == 0 {
            return;
        }

        let queue = &mut self.queue;
        params.drain_to_render(|param_id, value| {
            queue.inject_param(param_id, value);
        });
        self.queue.clamp_times(frames);

        let events = self.queue.as_slice();
        for segment in Segments::new(events, frames, self.max_frames, self.split_at_events) {
            let start = segment.start;
            let len = segment.len;
            rebase_into(&events[segment.events], start, &mut self.scratch);

            for channel in &mut self.inputs {
                channel[..len].copy_from_slice(&input[start..start + len]);
            }
            for channel in &mut self.outputs {
                channel[..len].fill(0.0);
            }

            let mut input_ptrs = [ptr::null_mut::<f32>(); MAX_CHANNELS];
            for (slot, channel) in input_ptrs.iter_mut().zip(&mut self.inputs) {
                *slot = channel.as_mut_ptr();
            }
            let mut output_ptrs = [ptr::null_mut::<f32>(); MAX_CHANNELS];
            for (slot, channel) in output_ptrs.iter_mut().zip(&mut self.outputs) {
                *slot = channel.as_mut_ptr();
            }

            let audio_input = clap_audio_buffer {
                data32: input_ptrs.as_mut_ptr(),
                data64: ptr::null_mut(),
                channel_count: self.inputs.len() as u32,
                latency: 0,
                constant_mask: 0,
            };
            let mut audio_output = clap_audio_buffer {
                data32: output_ptrs.as_mut_ptr(),
                data64: ptr::null_mut(),
                channel_count: self.outputs.len() as u32,
                latency: 0,
                constant_mask: 0,
            };
            let has_input = !self.inputs.is_empty();
            let has_output = !self.outputs.is_empty();

            let steady_time = self.steady_time;
            let scratch = &self.scratch;
            let status = with_input_events(scratch, |in_events| {
                with_output_events(&mut self.out_events, |out_events| {
                    let process = clap_process {
                        steady_time,
                        frames_count: len as u32,
                        transport: ptr::null(),
                        audio_inputs: if has_input {
                            &audio_input as *const clap_audio_buffer
                        } else {
                            ptr::null()
                        },
                        audio_outputs: if has_output {
                            &mut audio_output as *mut clap_audio_buffer
                        } else {
                            ptr::null_mut()
                        },
                        audio_inputs_count: has_input as u32,
                        audio_outputs_count: has_output as u32,
                        in_events,
                        out_events,
                    };
                    instance.process(&process)
                })
            });
            self.steady_time += len as i64;

            let out = &mut output[start..start + len];
            if status == ProcessStatus::Error {
                if !self.error_reported {
                    error!(
                        path = %instance.path().display(),
                        "plugin reported a processing error, bypassing failed blocks"
                    );
                    self.error_reported = true;
                }
                if self.is_instrument {
                    out.fill(0.0);
                } else {
                    out.copy_from_slice(&input[start..start + len]);
                }
            } else {
                self.downmix.fold(&self.outputs, len, out);
            }

            for event in self.out_events.as_slice() {
                match *event {
                    OutputEvent::NoteEnd {
                        note_id,
                        channel,
                        key,
                    } => {
                        if let Some(voices) = self.voices.as_mut() {
                            voices.on_note_end(note_id, channel, key);
                        }
                    }
                    OutputEvent::ParamValue { param_id, value } => {
                        params.publish_from_plugin(param_id, value);
                    }
                }
            }
            self.out_events.clear();
        }

        self.queue.clear();
        if let Some(voices) = self.voices.as_mut() {
            voices.collect_released();
        }
    }
}

/// Copy the overlapping frames and zero whatever output is left over.
pub(crate) fn copy_through(input: &[f32], output: &mut [f32]) {
    let frames = input.len().min(output.len());
    output[..frames].copy_from_slice(&input[..frames]);
    output[frames..].fill(0.0);
}
