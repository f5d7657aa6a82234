// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Generation-checked handle table.
//!
//! Handle layout (most significant bits first):
//!
//! ```text
//!  63      56 55           32 31             0
//! ┌──────────┬───────────────┬────────────────┐
//! │ table tag│  generation   │   index + 1    │
//! └──────────┴───────────────┴────────────────┘
//! ```
//!
//! The tag keeps handles from different tables distinct, and lets a bare
//! handle be routed to its table. Removing an entry bumps its slot's
//! generation; a slot whose generation is exhausted is retired rather than
//! reused, so no handle value is ever issued twice.

use crate::errors::{FlowError, FlowResult};
use crate::observability::messages::bridge::{HandleDisposed, HandleIssued};
use crate::observability::messages::StructuredLog;

pub type Handle = u64;

const INDEX_BITS: u32 = 32;
const GENERATION_BITS: u32 = 24;
const TAG_SHIFT: u32 = INDEX_BITS + GENERATION_BITS;
const MAX_GENERATION: u32 = (1 << GENERATION_BITS) - 1;
const MAX_SLOTS: usize = u32::MAX as usize - 1;

/// Table a handle belongs to.
pub fn handle_tag(handle: Handle) -> u8 {
    (handle >> TAG_SHIFT) as u8
}

fn encode(tag: u8, generation: u32, index: usize) -> Handle {
    ((tag as u64) << TAG_SHIFT) | ((generation as u64) << INDEX_BITS) | (index as u64 + 1)
}

struct Slot<V> {
    generation: u32,
    value: Option<V>,
}

pub struct HandleTable<V> {
    name: &'static str,
    tag: u8,
    slots: Vec<Slot<V>>,
    free: Vec<usize>,
    live: usize,
}

impl<V> HandleTable<V> {
    pub fn new(name: &'static str, tag: u8) -> Self {
        Self {
            name,
            tag,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn insert(&mut self, value: V) -> FlowResult<Handle> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.slots.len() >= MAX_SLOTS {
                    return Err(FlowError::Internal(format!(
                        "{} table is exhausted",
                        self.name
                    )));
                }
                self.slots.push(Slot {
                    generation: 1,
                    value: None,
                });
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.live += 1;

        let handle = encode(self.tag, slot.generation, index);
        HandleIssued {
            table: self.name,
            handle,
        }
        .log();
        Ok(handle)
    }

    fn locate(&self, handle: Handle) -> FlowResult<usize> {
        let low = handle & u64::from(u32::MAX);
        let generation = ((handle >> INDEX_BITS) as u32) & MAX_GENERATION;
        if handle_tag(handle) != self.tag || low == 0 {
            return Err(FlowError::InvalidHandle(handle));
        }
        let index = (low - 1) as usize;
        match self.slots.get(index) {
            Some(slot) if slot.generation == generation && slot.value.is_some() => Ok(index),
            _ => Err(FlowError::InvalidHandle(handle)),
        }
    }

    pub fn get(&self, handle: Handle) -> FlowResult<&V> {
        let index = self.locate(handle)?;
        self.slots[index]
            .value
            .as_ref()
            .ok_or(FlowError::InvalidHandle(handle))
    }

    pub fn get_mut(&mut self, handle: Handle) -> FlowResult<&mut V> {
        let index = self.locate(handle)?;
        self.slots[index]
            .value
            .as_mut()
            .ok_or(FlowError::InvalidHandle(handle))
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.locate(handle).is_ok()
    }

    /// Releases the entry. A second remove of the same handle fails.
    pub fn remove(&mut self, handle: Handle) -> FlowResult<V> {
        let index = self.locate(handle)?;
        let slot = &mut self.slots[index];
        let value = slot.value.take().ok_or(FlowError::InvalidHandle(handle))?;
        self.live -= 1;
        if slot.generation < MAX_GENERATION {
            slot.generation += 1;
            self.free.push(index);
        }
        HandleDisposed {
            table: self.name,
            handle,
        }
        .log();
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Removes every entry, returning the values.
    pub fn drain(&mut self) -> Vec<V> {
        let mut values = Vec::with_capacity(self.live);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                values.push(value);
                if slot.generation < MAX_GENERATION {
                    slot.generation += 1;
                    self.free.push(index);
                }
            }
        }
        self.live = 0;
        values
    }
}
