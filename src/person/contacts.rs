//! The traceable-contact ledger: a fixed ring of day slots holding the persons met on each
//! of the last `RETENTION_DAYS` days.

use serde::{Deserialize, Serialize};

use super::PersonId;

/// Number of days a contact is kept for tracing.
pub const RETENTION_DAYS: usize = 14;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct DaySlot {
    day: Option<i64>,
    persons: Vec<PersonId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceableContacts {
    slots: [DaySlot; RETENTION_DAYS],
}

fn slot_index(day: i64) -> usize {
    // rem_euclid of a positive modulus is never negative
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = day.rem_euclid(RETENTION_DAYS as i64) as usize;
    index
}

impl TraceableContacts {
    /// Records `other` as met on `day`. A slot still holding an older day is reset; contacts
    /// for a day that has already left the ring are dropped.
    pub fn add(&mut self, other: PersonId, day: i64) {
        let slot = &mut self.slots[slot_index(day)];
        match slot.day {
            Some(existing) if existing > day => return,
            Some(existing) if existing == day => {}
            _ => {
                slot.day = Some(day);
                slot.persons.clear();
            }
        }
        if !slot.persons.contains(&other) {
            slot.persons.push(other);
        }
    }

    /// Persons met on exactly `day`.
    #[must_use]
    pub fn on_day(&self, day: i64) -> &[PersonId] {
        let slot = &self.slots[slot_index(day)];
        if slot.day == Some(day) {
            &slot.persons
        } else {
            &[]
        }
    }

    /// Persons met on `from_day` or later, in slot order. A person met on several days is
    /// returned once.
    #[must_use]
    pub fn since(&self, from_day: i64) -> Vec<PersonId> {
        let mut slots: Vec<&DaySlot> = self
            .slots
            .iter()
            .filter(|slot| slot.day.is_some_and(|day| day >= from_day))
            .collect();
        slots.sort_by_key(|slot| slot.day);

        let mut persons = Vec::new();
        for person in slots.into_iter().flat_map(|slot| slot.persons.iter()) {
            if !persons.contains(person) {
                persons.push(*person);
            }
        }
        persons
    }

    /// Clears every slot holding a day before `before_day`.
    pub fn purge(&mut self, before_day: i64) {
        for slot in &mut self.slots {
            if slot.day.is_some_and(|day| day < before_day) {
                slot.day = None;
                slot.persons.clear();
            }
        }
    }

    pub fn clear(&mut self) {
        self.purge(i64::MAX);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.persons.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_without_duplicates() {
        let mut contacts = TraceableContacts::default();
        contacts.add(PersonId(1), 3);
        contacts.add(PersonId(1), 3);
        contacts.add(PersonId(2), 3);
        assert_eq!(contacts.on_day(3), &[PersonId(1), PersonId(2)]);
        assert!(contacts.on_day(4).is_empty());
    }

    #[test]
    fn reused_slot_is_reset() {
        let mut contacts = TraceableContacts::default();
        contacts.add(PersonId(1), 0);
        contacts.add(PersonId(2), 14);
        assert!(contacts.on_day(0).is_empty());
        assert_eq!(contacts.on_day(14), &[PersonId(2)]);

        // a day older than the one in the slot is out of the window
        contacts.add(PersonId(3), 0);
        assert_eq!(contacts.on_day(14), &[PersonId(2)]);
    }

    #[test]
    fn since_and_purge() {
        let mut contacts = TraceableContacts::default();
        contacts.add(PersonId(1), 5);
        contacts.add(PersonId(2), 6);
        contacts.add(PersonId(1), 7);
        assert_eq!(contacts.since(6), vec![PersonId(2), PersonId(1)]);
        assert_eq!(contacts.since(5), vec![PersonId(1), PersonId(2)]);

        contacts.purge(7);
        assert_eq!(contacts.since(0), vec![PersonId(1)]);
        contacts.clear();
        assert!(contacts.is_empty());
    }

    #[test]
    fn negative_days() {
        let mut contacts = TraceableContacts::default();
        contacts.add(PersonId(4), -1);
        assert_eq!(contacts.on_day(-1), &[PersonId(4)]);
        assert!(contacts.on_day(13).is_empty());
    }
}
