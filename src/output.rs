//! Output registry
//!
//! Tracks connected displays. Each output gets its initial mode negotiated,
//! a place in the output layout and a scene output on arrival, and is unwired
//! again when the platform destroys it. Losing the last output ends the
//! session.

use indexmap::IndexMap;
use tracing::{debug, info, trace, warn};

use crate::event::{OutputConfiguration, OutputId};
use crate::platform::{Platform, Signal, Source, Subscription};
use crate::utils::get_monotonic_time;
use crate::{tracy_frame_mark, tracy_span, Session};

/// A connected output
#[derive(Debug)]
pub struct OutputEntry {
    pub id: OutputId,
    pub name: String,
    /// Top-left corner in the output layout
    pub position: (i32, i32),
    frame: Subscription,
    request_state: Subscription,
    destroy: Subscription,
}

#[derive(Debug, Default)]
pub struct OutputRegistry {
    entries: IndexMap<OutputId, OutputEntry>,
}

impl OutputRegistry {
    pub fn get(&self, id: OutputId) -> Option<&OutputEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: OutputId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, entry: OutputEntry) {
        self.entries.insert(entry.id, entry);
    }

    fn remove(&mut self, id: OutputId) -> Option<OutputEntry> {
        self.entries.shift_remove(&id)
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = OutputEntry> + '_ {
        self.entries.drain(..).map(|(_, entry)| entry)
    }
}

impl OutputEntry {
    pub(crate) fn into_subscriptions(self) -> [Subscription; 3] {
        [self.frame, self.request_state, self.destroy]
    }
}

impl Session {
    pub(crate) fn on_new_output<P: Platform>(
        &mut self,
        platform: &mut P,
        output: OutputId,
        name: String,
    ) {
        if self.outputs.contains(output) {
            warn!("Output {name} ({output}) announced twice, ignoring");
            return;
        }

        platform.output_init_render(output);

        let mut configuration = OutputConfiguration::enable();
        match platform.output_preferred_mode(output) {
            Some(mode) => {
                info!(
                    "Output {name}: preferred mode {}x{}@{}",
                    mode.width,
                    mode.height,
                    mode.refresh as f64 / 1000.0
                );
                configuration.mode = Some(mode);
            }
            None => debug!("Output {name} has no preferred mode"),
        }
        if !platform.output_commit(output, &configuration) {
            warn!("Failed to commit initial state for output {name}");
        }

        let frame = self.listeners.subscribe(Source::Output(output), Signal::Frame);
        let request_state = self
            .listeners
            .subscribe(Source::Output(output), Signal::RequestState);
        let destroy = self.listeners.subscribe(Source::Output(output), Signal::Destroy);

        let position = platform.layout_add_auto(output);
        platform.scene_output_create(output);

        info!(
            "Output {name} ({output}) added at ({}, {})",
            position.0, position.1
        );
        self.outputs.insert(OutputEntry {
            id: output,
            name,
            position,
            frame,
            request_state,
            destroy,
        });
    }

    pub(crate) fn on_output_frame<P: Platform>(&mut self, platform: &mut P, output: OutputId) {
        tracy_span!("on_output_frame");
        tracy_frame_mark!();

        if !platform.scene_output_commit(output) {
            trace!("Output {output}: nothing to commit");
        }
        platform.scene_output_frame_done(output, get_monotonic_time());
    }

    pub(crate) fn on_output_request_state<P: Platform>(
        &mut self,
        platform: &mut P,
        output: OutputId,
        configuration: OutputConfiguration,
    ) {
        debug!("Output {output}: state requested {configuration:?}");
        if !platform.output_commit(output, &configuration) {
            warn!("Output {output}: requested state was rejected");
        }
    }

    pub(crate) fn on_output_destroy<P: Platform>(&mut self, platform: &mut P, output: OutputId) {
        let Some(entry) = self.outputs.remove(output) else {
            warn!("Destroy for unknown output {output}");
            return;
        };
        info!("Output {} ({output}) removed", entry.name);

        for subscription in entry.into_subscriptions() {
            self.listeners.unsubscribe(subscription);
        }
        platform.layout_remove(output);
        platform.scene_output_destroy(output);

        if self.outputs.is_empty() {
            info!("Last output closed, terminating session");
            self.terminate();
        }
    }
}
