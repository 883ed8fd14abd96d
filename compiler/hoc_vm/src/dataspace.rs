//! Per-object and top-level storage blocks.
//!
//! A dataspace has one slot per data-bearing symbol of its scope, addressed
//! by the symbol's `oboff`. Each slot carries its value and its live shape;
//! the shape lives in the slot rather than the symbol because two objects of
//! the same template may size the same member differently.

use std::rc::Rc;

use hoc_ir::ObjectId;

use crate::symbol::Arrayinfo;

/// Value held by one slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SlotValue {
    /// Allocated but never declared in this dataspace.
    #[default]
    Empty,
    Numbers(Vec<f64>),
    Str(String),
    /// Object references; each `Some` holds one counted reference.
    Objects(Vec<Option<ObjectId>>),
}

impl SlotValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SlotValue::Empty => "empty",
            SlotValue::Numbers(_) => "numbers",
            SlotValue::Str(_) => "string",
            SlotValue::Objects(_) => "objects",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataSlot {
    pub value: SlotValue,
    pub shape: Option<Rc<Arrayinfo>>,
}

impl DataSlot {
    /// Element count implied by the shape (1 for scalars).
    pub fn total(&self) -> usize {
        self.shape.as_ref().map_or(1, |shape| shape.total())
    }
}

/// Storage block for one scope instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataspace {
    slots: Vec<DataSlot>,
}

impl Dataspace {
    pub fn with_size(size: usize) -> Self {
        Dataspace {
            slots: vec![DataSlot::default(); size],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append an empty slot and return its `oboff`.
    pub fn grow(&mut self) -> usize {
        self.slots.push(DataSlot::default());
        self.slots.len() - 1
    }

    /// Make sure `oboff` is addressable, padding with empty slots.
    pub fn ensure(&mut self, oboff: usize) {
        if oboff >= self.slots.len() {
            self.slots.resize(oboff + 1, DataSlot::default());
        }
    }

    #[inline]
    pub fn slot(&self, oboff: usize) -> Option<&DataSlot> {
        self.slots.get(oboff)
    }

    #[inline]
    pub fn slot_mut(&mut self, oboff: usize) -> Option<&mut DataSlot> {
        self.slots.get_mut(oboff)
    }

    /// Every object reference held in the block, with its slot.
    pub fn object_refs(&self) -> impl Iterator<Item = (usize, ObjectId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(oboff, slot)| match &slot.value {
                SlotValue::Objects(objects) => Some((oboff, objects)),
                _ => None,
            })
            .flat_map(|(oboff, objects)| objects.iter().flatten().map(move |id| (oboff, *id)))
    }

    /// Replace every slot with `Empty`, returning the previous slots.
    pub fn take_slots(&mut self) -> Vec<DataSlot> {
        std::mem::take(&mut self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_and_ensure_pad_with_empty_slots() {
        let mut data = Dataspace::default();
        assert_eq!(data.grow(), 0);
        data.ensure(3);
        assert_eq!(data.len(), 4);
        assert_eq!(data.slot(2).map(|s| &s.value), Some(&SlotValue::Empty));
    }

    #[test]
    fn object_refs_lists_live_references() {
        let mut data = Dataspace::with_size(2);
        if let Some(slot) = data.slot_mut(1) {
            slot.value = SlotValue::Objects(vec![None, Some(ObjectId::new(7))]);
        }
        let refs: Vec<_> = data.object_refs().collect();
        assert_eq!(refs, vec![(1, ObjectId::new(7))]);
    }
}
