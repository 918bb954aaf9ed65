//! Keyboard registry and input-device arrival
//!
//! Every attached keyboard gets a keymap and its own subscriptions. The seat
//! only knows one active keyboard at a time: whichever keyboard produced the
//! last modifiers or key event becomes current.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::event::{
    DeviceId, DeviceKind, InputDevice, KeyEvent, KeyState, Modifiers, SeatCapabilities,
};
use crate::platform::{Platform, Signal, Source, Subscription};
use crate::Session;

/// An attached keyboard
#[derive(Debug)]
pub struct KeyboardEntry {
    pub id: DeviceId,
    pub name: String,
    modifiers: Subscription,
    key: Subscription,
    destroy: Subscription,
}

impl KeyboardEntry {
    pub(crate) fn into_subscriptions(self) -> [Subscription; 3] {
        [self.modifiers, self.key, self.destroy]
    }
}

#[derive(Debug, Default)]
pub struct KeyboardRegistry {
    entries: IndexMap<DeviceId, KeyboardEntry>,
}

impl KeyboardRegistry {
    pub fn get(&self, id: DeviceId) -> Option<&KeyboardEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recently attached keyboard
    pub fn last(&self) -> Option<DeviceId> {
        self.entries.last().map(|(id, _)| *id)
    }

    fn insert(&mut self, entry: KeyboardEntry) {
        self.entries.insert(entry.id, entry);
    }

    fn remove(&mut self, id: DeviceId) -> Option<KeyboardEntry> {
        self.entries.shift_remove(&id)
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = KeyboardEntry> + '_ {
        self.entries.drain(..).map(|(_, entry)| entry)
    }
}

impl Session {
    pub(crate) fn on_new_input<P: Platform>(&mut self, platform: &mut P, device: InputDevice) {
        match device.kind {
            DeviceKind::Keyboard => self.setup_keyboard(platform, device),
            DeviceKind::Pointer => self.attach_pointer(platform, device),
            kind => debug!("Ignoring {kind:?} device {}", device.name),
        }
        self.publish_capabilities(platform);
    }

    fn setup_keyboard<P: Platform>(&mut self, platform: &mut P, device: InputDevice) {
        if self.keyboards.contains(device.id) {
            warn!("Keyboard {} ({}) announced twice, ignoring", device.name, device.id);
            return;
        }

        let keymap = match platform.keymap_compile(&self.config.keymap) {
            Ok(keymap) => keymap,
            Err(err) => {
                warn!("Dropping keyboard {}: {err}", device.name);
                return;
            }
        };
        platform.keyboard_set_keymap(device.id, &keymap);
        platform.keyboard_set_repeat_info(
            device.id,
            self.config.repeat_rate,
            self.config.repeat_delay,
        );

        let source = Source::Keyboard(device.id);
        let modifiers = self.listeners.subscribe(source, Signal::Modifiers);
        let key = self.listeners.subscribe(source, Signal::Key);
        let destroy = self.listeners.subscribe(source, Signal::Destroy);

        self.make_current_keyboard(platform, device.id);

        info!("Keyboard {} ({}) attached", device.name, device.id);
        self.keyboards.insert(KeyboardEntry {
            id: device.id,
            name: device.name,
            modifiers,
            key,
            destroy,
        });
    }

    /// Pointer always, keyboard while at least one is attached.
    fn publish_capabilities<P: Platform>(&mut self, platform: &mut P) {
        let mut capabilities = SeatCapabilities::POINTER;
        if !self.keyboards.is_empty() {
            capabilities |= SeatCapabilities::KEYBOARD;
        }
        platform.seat_set_capabilities(capabilities);
    }

    fn make_current_keyboard<P: Platform>(&mut self, platform: &mut P, keyboard: DeviceId) {
        if self.seat.current_keyboard != Some(keyboard) {
            debug!("Keyboard {keyboard} is now current");
        }
        self.seat.current_keyboard = Some(keyboard);
        platform.seat_set_keyboard(Some(keyboard));
    }

    pub(crate) fn on_keyboard_modifiers<P: Platform>(
        &mut self,
        platform: &mut P,
        keyboard: DeviceId,
        modifiers: Modifiers,
    ) {
        self.make_current_keyboard(platform, keyboard);
        platform.seat_notify_modifiers(modifiers);
    }

    pub(crate) fn on_keyboard_key<P: Platform>(
        &mut self,
        platform: &mut P,
        keyboard: DeviceId,
        event: KeyEvent,
    ) {
        if event.state == KeyState::Pressed
            && self.config.quit_binding.matches(event.modifiers, &event.symbols)
        {
            info!("Quit shortcut pressed, terminating session");
            self.terminate();
            return;
        }

        self.make_current_keyboard(platform, keyboard);
        platform.seat_notify_key(&event);
    }

    pub(crate) fn on_keyboard_destroy<P: Platform>(&mut self, platform: &mut P, keyboard: DeviceId) {
        let Some(entry) = self.keyboards.remove(keyboard) else {
            warn!("Destroy for unknown keyboard {keyboard}");
            return;
        };
        info!("Keyboard {} ({keyboard}) detached", entry.name);

        for subscription in entry.into_subscriptions() {
            self.listeners.unsubscribe(subscription);
        }

        if self.seat.current_keyboard == Some(keyboard) {
            let fallback = self.keyboards.last();
            match fallback {
                Some(next) => debug!("Falling back to keyboard {next}"),
                None => debug!("No keyboard left on the seat"),
            }
            self.seat.current_keyboard = fallback;
            platform.seat_set_keyboard(fallback);
        }

        self.publish_capabilities(platform);
    }
}
