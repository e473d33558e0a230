//! Source → destination channel routing with a parallel send table.

/*
Routing Matrix
==============

Each source channel is routed to at most one destination channel, and may
additionally send to one destination:

    route[src] = Some(dst) | None
    send[src]  = Some(dst) | None

The default is the stereo identity: route[0] = 0, route[1] = 1, nothing
else connected.


Stereo Pair Mode
----------------

With `num_allowed_connections == Some(2)` a table may hold at most two
connections. Both rules work on even/odd parity, not on recency:

  connect    if a third connection appears, every other connection with the
             same parity as the new source is dropped

  disconnect if fewer than two remain, the identity connection of the
             removed source's parity (0 → 0 or 1 → 1) is put back

    route = [0, 1, -, -]   connect(2, 2)  →  [-, 1, 2, -]
    route = [-, 1, 2, -]   disconnect(2)  →  [0, 1, -, -]


Summaries
---------

Callers that only understand one stereo pair read the leftmost and rightmost
connected sources (`left_pair`, `right_pair`). They are recomputed after
every change and are `None` while nothing is routed.
*/

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    notify::{ChangeBroadcaster, ChangeListener},
    routing::preset::RoutingPreset,
    state::StateTree,
    MAX_CHANNELS,
};

pub const ROUTING_RECORD: &str = "RoutingMatrix";

/// Which connection table an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Route,
    Send,
}

/// Whether a channel count change tells the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    Send,
    Suppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPair {
    pub source: usize,
    pub target: usize,
}

/// Callbacks for the processor that owns the matrix.
pub trait MatrixListener: Send + Sync {
    fn num_source_channels_changed(&self, _num_channels: usize) {}
    fn num_destination_channels_changed(&self, _num_channels: usize) {}
    fn connection_changed(&self, _left: Option<ChannelPair>, _right: Option<ChannelPair>) {}
}

/// The connection state. All logic lives here; `RoutingMatrix` adds the lock
/// and the notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixData {
    num_source: usize,
    num_destination: usize,
    route: [Option<usize>; MAX_CHANNELS],
    send: [Option<usize>; MAX_CHANNELS],

    source_gain: [f32; MAX_CHANNELS],
    target_gain: [f32; MAX_CHANNELS],

    num_allowed_connections: Option<usize>,
    resize_allowed: bool,
    only_enabling_allowed: bool,
    editor_shown: bool,

    left: Option<ChannelPair>,
    right: Option<ChannelPair>,
}

impl Default for MatrixData {
    fn default() -> Self {
        let mut data = Self {
            num_source: 2,
            num_destination: 2,
            route: [None; MAX_CHANNELS],
            send: [None; MAX_CHANNELS],
            source_gain: [0.0; MAX_CHANNELS],
            target_gain: [0.0; MAX_CHANNELS],
            num_allowed_connections: None,
            resize_allowed: false,
            only_enabling_allowed: false,
            editor_shown: false,
            left: None,
            right: None,
        };
        data.reset_to_default();
        data
    }
}

impl MatrixData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_source_channels(&self) -> usize {
        self.num_source
    }

    pub fn num_destination_channels(&self) -> usize {
        self.num_destination
    }

    fn table(&self, table: Table) -> &[Option<usize>; MAX_CHANNELS] {
        match table {
            Table::Route => &self.route,
            Table::Send => &self.send,
        }
    }

    fn table_mut(&mut self, table: Table) -> &mut [Option<usize>; MAX_CHANNELS] {
        match table {
            Table::Route => &mut self.route,
            Table::Send => &mut self.send,
        }
    }

    /// Raw entries for the current source count.
    pub fn connections(&self, table: Table) -> &[Option<usize>] {
        &self.table(table)[..self.num_source]
    }

    fn is_valid(&self, source: usize, destination: usize) -> bool {
        source < self.num_source && destination < self.num_destination
    }

    fn count_connections(&self, table: Table) -> usize {
        self.connections(table).iter().filter(|c| c.is_some()).count()
    }

    fn stereo_pair_mode(&self) -> bool {
        self.num_allowed_connections == Some(2)
    }

    /// Route `source` to `destination`. False (and no change) on an invalid
    /// index.
    pub fn connect(&mut self, table: Table, source: usize, destination: usize) -> bool {
        if !self.is_valid(source, destination) {
            return false;
        }

        self.table_mut(table)[source] = Some(destination);

        if self.stereo_pair_mode() && self.count_connections(table) > 2 {
            let parity = source % 2;
            let num_source = self.num_source;
            let entries = self.table_mut(table);
            for i in (parity..num_source).step_by(2) {
                if i != source {
                    entries[i] = None;
                }
            }
        }

        self.refresh_source_use_states();
        true
    }

    /// Remove the connection `source → destination`. A source routed
    /// elsewhere keeps its connection. False on an invalid index.
    pub fn disconnect(&mut self, table: Table, source: usize, destination: usize) -> bool {
        if !self.is_valid(source, destination) {
            return false;
        }

        if self.table(table)[source] != Some(destination) {
            return true;
        }
        self.table_mut(table)[source] = None;

        if self.stereo_pair_mode() && self.count_connections(table) < 2 {
            let index = source % 2;
            self.table_mut(table)[index] = Some(index);
        }

        self.refresh_source_use_states();
        true
    }

    /// Connect if `source` is not routed to `destination`, else disconnect.
    pub fn toggle(&mut self, table: Table, source: usize, destination: usize) -> bool {
        if !self.is_valid(source, destination) {
            return false;
        }

        if self.table(table)[source] == Some(destination) {
            self.disconnect(table, source, destination)
        } else {
            self.connect(table, source, destination)
        }
    }

    /// Toggle `source → source`. Only the source index is checked; with fewer
    /// destinations than `source + 1` nothing changes.
    pub fn toggle_enabling(&mut self, table: Table, source: usize) -> bool {
        if source >= self.num_source {
            return false;
        }
        self.toggle(table, source, source);
        true
    }

    pub fn is_used(&self, source: usize) -> bool {
        source < self.num_source && (self.route[source].is_some() || self.send[source].is_some())
    }

    fn destination_for(&self, table: Table, source: usize) -> Option<usize> {
        if source >= self.num_source {
            return None;
        }
        self.table(table)[source].filter(|&d| d < self.num_destination)
    }

    pub fn connection_for_source(&self, source: usize) -> Option<usize> {
        self.destination_for(Table::Route, source)
    }

    pub fn send_for_source(&self, source: usize) -> Option<usize> {
        self.destination_for(Table::Send, source)
    }

    /// Stereo identity, sends cleared, metering cleared.
    pub fn reset_to_default(&mut self) {
        self.route = [None; MAX_CHANNELS];
        self.send = [None; MAX_CHANNELS];
        self.route[0] = Some(0);
        self.route[1] = Some(1);
        self.source_gain = [0.0; MAX_CHANNELS];
        self.target_gain = [0.0; MAX_CHANNELS];
        self.refresh_source_use_states();
    }

    pub fn clear_all_connections(&mut self) {
        self.route = [None; MAX_CHANNELS];
        self.send = [None; MAX_CHANNELS];
        self.refresh_source_use_states();
    }

    /// Clamped to `[1, MAX_CHANNELS]`. Returns true if the count changed.
    /// Connections beyond the new count are kept but ignored.
    pub fn set_num_source_channels(&mut self, num_channels: usize) -> bool {
        let num_channels = num_channels.clamp(1, MAX_CHANNELS);
        if num_channels == self.num_source {
            return false;
        }
        self.num_source = num_channels;
        self.refresh_source_use_states();
        true
    }

    pub fn set_num_destination_channels(&mut self, num_channels: usize) -> bool {
        let num_channels = num_channels.clamp(1, MAX_CHANNELS);
        if num_channels == self.num_destination {
            return false;
        }
        self.num_destination = num_channels;
        self.refresh_source_use_states();
        true
    }

    pub fn num_allowed_connections(&self) -> Option<usize> {
        self.num_allowed_connections
    }

    /// `Some(2)` turns on stereo pair mode. `None` is unlimited.
    pub fn set_num_allowed_connections(&mut self, num: Option<usize>) {
        self.num_allowed_connections = num;
    }

    pub fn resize_allowed(&self) -> bool {
        self.resize_allowed
    }

    pub fn set_resize_allowed(&mut self, allowed: bool) {
        self.resize_allowed = allowed;
    }

    pub fn only_enabling_allowed(&self) -> bool {
        self.only_enabling_allowed
    }

    pub fn set_only_enabling_allowed(&mut self, allowed: bool) {
        self.only_enabling_allowed = allowed;
    }

    pub fn is_editor_shown(&self) -> bool {
        self.editor_shown
    }

    pub fn set_editor_shown(&mut self, shown: bool) {
        self.editor_shown = shown;
    }

    /// Store metering values, one per source (or destination) channel.
    /// Extra values are ignored, missing ones keep their old value.
    pub fn set_gain_values(&mut self, values: &[f32], is_source: bool) {
        let (gains, count) = if is_source {
            (&mut self.source_gain, self.num_source)
        } else {
            (&mut self.target_gain, self.num_destination)
        };
        let count = count.min(values.len());
        gains[..count].copy_from_slice(&values[..count]);
    }

    pub fn gain_values(&self, is_source: bool) -> &[f32] {
        if is_source {
            &self.source_gain[..self.num_source]
        } else {
            &self.target_gain[..self.num_destination]
        }
    }

    /// Clear the route table and apply `preset` through `connect`, so stereo
    /// pair mode applies to presets as well.
    pub fn load_preset(&mut self, preset: RoutingPreset) {
        self.clear_all_connections();
        for (source, destination) in preset.connections(self.num_source) {
            self.connect(Table::Route, source, destination);
        }
    }

    pub fn left_pair(&self) -> Option<ChannelPair> {
        self.left
    }

    pub fn right_pair(&self) -> Option<ChannelPair> {
        self.right
    }

    fn refresh_source_use_states(&mut self) {
        let pair = |(source, target): (usize, &Option<usize>)| target.map(|target| ChannelPair { source, target });
        let route = &self.route[..self.num_source];

        self.left = route.iter().enumerate().find_map(pair);
        self.right = route.iter().enumerate().rev().find_map(pair);
    }

    pub fn export_state(&self) -> StateTree {
        let raw = |entry: Option<usize>| entry.map_or(-1, |d| d as i64);

        let mut tree = StateTree::new(ROUTING_RECORD).with("NumSourceChannels", self.num_source);
        for i in 0..self.num_source {
            tree.set(format!("Channel{i}"), raw(self.route[i]));
            tree.set(format!("Send{i}"), raw(self.send[i]));
        }
        tree
    }

    /// Rebuild from a record made by `export_state`. A record of another type
    /// is ignored and false is returned. Entries are taken as stored.
    pub fn restore_state(&mut self, tree: &StateTree) -> bool {
        if !tree.has_type(ROUTING_RECORD) {
            return false;
        }

        self.clear_all_connections();
        let num_source = tree.get_i64_or("NumSourceChannels", 2).max(1) as usize;
        self.set_num_source_channels(num_source);

        let entry = |value: i64| usize::try_from(value).ok().filter(|&d| d < MAX_CHANNELS);
        for i in 0..self.num_source {
            let channel = format!("Channel{i}");
            if tree.has_property(&channel) {
                self.route[i] = entry(tree.get_i64_or(&channel, -1));
            }
            let send = format!("Send{i}");
            if tree.has_property(&send) {
                self.send[i] = entry(tree.get_i64_or(&send, -1));
            }
        }

        self.refresh_source_use_states();
        true
    }
}

/// A routing matrix owned by one processor.
///
/// Every operation takes the matrix lock for O(MAX_CHANNELS) work. Owner
/// callbacks and editor notifications run after it is released, so a
/// listener may read the matrix back.
pub struct RoutingMatrix {
    data: Mutex<MatrixData>,
    owner: Mutex<Option<Weak<dyn MatrixListener>>>,
    broadcaster: ChangeBroadcaster,
}

impl Default for RoutingMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingMatrix {
    pub fn new() -> Self {
        Self::with_data(MatrixData::new())
    }

    pub fn with_data(data: MatrixData) -> Self {
        Self {
            data: Mutex::new(data),
            owner: Mutex::new(None),
            broadcaster: ChangeBroadcaster::new(),
        }
    }

    /// The owner is held weakly; once dropped it is simply not called.
    pub fn set_owner(&self, owner: &Arc<dyn MatrixListener>) {
        *self.owner.lock() = Some(Arc::downgrade(owner));
    }

    pub fn add_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.broadcaster.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.broadcaster.remove_listener(listener);
    }

    /// Hold the matrix lock, for rendering against a stable table.
    pub fn lock(&self) -> MutexGuard<'_, MatrixData> {
        self.data.lock()
    }

    pub fn snapshot(&self) -> MatrixData {
        self.data.lock().clone()
    }

    fn owner(&self) -> Option<Arc<dyn MatrixListener>> {
        self.owner.lock().as_ref().and_then(Weak::upgrade)
    }

    fn connection_changed(&self) {
        let (left, right) = {
            let data = self.data.lock();
            (data.left, data.right)
        };
        if let Some(owner) = self.owner() {
            owner.connection_changed(left, right);
        }
        self.broadcaster.send_change(ROUTING_RECORD);
    }

    fn edit(&self, f: impl FnOnce(&mut MatrixData) -> bool) -> bool {
        let changed = {
            let mut data = self.data.lock();
            f(&mut data)
        };
        if changed {
            self.connection_changed();
        }
        changed
    }

    pub fn num_source_channels(&self) -> usize {
        self.data.lock().num_source
    }

    pub fn num_destination_channels(&self) -> usize {
        self.data.lock().num_destination
    }

    pub fn set_num_source_channels(&self, num_channels: usize, notify: Notify) {
        let changed = self.data.lock().set_num_source_channels(num_channels);
        if !changed {
            return;
        }

        self.connection_changed();
        if notify == Notify::Send {
            if let Some(owner) = self.owner() {
                owner.num_source_channels_changed(self.num_source_channels());
            }
        }
    }

    pub fn set_num_destination_channels(&self, num_channels: usize, notify: Notify) {
        let changed = self.data.lock().set_num_destination_channels(num_channels);
        if !changed {
            return;
        }

        self.connection_changed();
        if notify == Notify::Send {
            if let Some(owner) = self.owner() {
                owner.num_destination_channels_changed(self.num_destination_channels());
            }
        }
    }

    pub fn connect(&self, source: usize, destination: usize) -> bool {
        self.edit(|d| d.connect(Table::Route, source, destination))
    }

    pub fn disconnect(&self, source: usize, destination: usize) -> bool {
        self.edit(|d| d.disconnect(Table::Route, source, destination))
    }

    pub fn toggle(&self, source: usize, destination: usize) -> bool {
        self.edit(|d| d.toggle(Table::Route, source, destination))
    }

    pub fn send_connect(&self, source: usize, destination: usize) -> bool {
        self.edit(|d| d.connect(Table::Send, source, destination))
    }

    pub fn send_disconnect(&self, source: usize, destination: usize) -> bool {
        self.edit(|d| d.disconnect(Table::Send, source, destination))
    }

    pub fn send_toggle(&self, source: usize, destination: usize) -> bool {
        self.edit(|d| d.toggle(Table::Send, source, destination))
    }

    pub fn toggle_enabling(&self, source: usize) -> bool {
        self.edit(|d| d.toggle_enabling(Table::Route, source))
    }

    pub fn toggle_send_enabling(&self, source: usize) -> bool {
        self.edit(|d| d.toggle_enabling(Table::Send, source))
    }

    pub fn is_used(&self, source: usize) -> bool {
        self.data.lock().is_used(source)
    }

    pub fn connection_for_source(&self, source: usize) -> Option<usize> {
        self.data.lock().connection_for_source(source)
    }

    pub fn send_for_source(&self, source: usize) -> Option<usize> {
        self.data.lock().send_for_source(source)
    }

    pub fn left_pair(&self) -> Option<ChannelPair> {
        self.data.lock().left
    }

    pub fn right_pair(&self) -> Option<ChannelPair> {
        self.data.lock().right
    }

    pub fn reset_to_default(&self) {
        self.edit(|d| {
            d.reset_to_default();
            true
        });
    }

    pub fn clear_all_connections(&self) {
        self.edit(|d| {
            d.clear_all_connections();
            true
        });
    }

    pub fn set_num_allowed_connections(&self, num: Option<usize>) {
        self.data.lock().set_num_allowed_connections(num);
    }

    pub fn set_resize_allowed(&self, allowed: bool) {
        self.data.lock().set_resize_allowed(allowed);
    }

    pub fn set_only_enabling_allowed(&self, allowed: bool) {
        self.data.lock().set_only_enabling_allowed(allowed);
    }

    pub fn set_editor_shown(&self, shown: bool) {
        self.data.lock().set_editor_shown(shown);
    }

    pub fn is_editor_shown(&self) -> bool {
        self.data.lock().editor_shown
    }

    pub fn set_gain_values(&self, values: &[f32], is_source: bool) {
        self.data.lock().set_gain_values(values, is_source);
    }

    pub fn gain_values(&self, is_source: bool) -> Vec<f32> {
        self.data.lock().gain_values(is_source).to_vec()
    }

    pub fn load_preset(&self, preset: RoutingPreset) {
        self.edit(|d| {
            d.load_preset(preset);
            true
        });
        debug!(%preset, "routing preset loaded");
    }

    /// Load a preset by name. Unknown names change nothing.
    pub fn load_preset_named(&self, name: &str) -> bool {
        match name.parse::<RoutingPreset>() {
            Ok(preset) => {
                self.load_preset(preset);
                true
            }
            Err(err) => {
                warn!(%err, "routing preset not loaded");
                false
            }
        }
    }

    pub fn export_state(&self) -> StateTree {
        self.data.lock().export_state()
    }

    pub fn restore_state(&self, tree: &StateTree) -> bool {
        let (restored, num_source) = {
            let mut data = self.data.lock();
            let before = data.num_source;
            let restored = data.restore_state(tree);
            (restored, (data.num_source != before).then_some(data.num_source))
        };

        if !restored {
            debug!(found = %tree.kind, "ignoring record of another type");
            return false;
        }

        self.connection_changed();
        if let (Some(num_source), Some(owner)) = (num_source, self.owner()) {
            owner.num_source_channels_changed(num_source);
        }
        debug!("routing matrix restored");
        true
    }
}

impl std::fmt::Debug for RoutingMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingMatrix").field("data", &*self.data.lock()).finish()
    }
}
