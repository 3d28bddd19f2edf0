use crate::model::*;

/// A reservation's footprint on its room's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub id: Id,
    pub span: Span,
}

/// A room row plus the spans of every reservation booked on it.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Sorted by `span.start`.
    pub slots: Vec<Slot>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            slots: Vec::new(),
        }
    }

    /// Insert keeping sort order by start.
    pub fn insert_slot(&mut self, slot: Slot) {
        let pos = self
            .slots
            .binary_search_by_key(&slot.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    pub fn remove_slot(&mut self, id: Id) -> Option<Slot> {
        let pos = self.slots.iter().position(|s| s.id == id)?;
        Some(self.slots.remove(pos))
    }

    /// Slots overlapping `query`. Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Slot> {
        let right_bound = self.slots.partition_point(|s| s.span.start < query.end);
        self.slots[..right_bound]
            .iter()
            .filter(move |s| s.span.overlaps(query))
    }

    pub fn first_overlap(&self, query: &Span, exclude: Option<Id>) -> Option<&Slot> {
        self.overlapping(query).find(|s| Some(s.id) != exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RoomState {
        RoomState::new(Room {
            id: 1,
            code: "A1".into(),
            name: "Auditorium".into(),
            location: "Ground floor".into(),
            capacity: 120,
        })
    }

    fn slot(id: Id, start: Ms, end: Ms) -> Slot {
        Slot {
            id,
            span: Span::new(start, end),
        }
    }

    #[test]
    fn slots_stay_sorted() {
        let mut rs = state();
        rs.insert_slot(slot(1, 300, 400));
        rs.insert_slot(slot(2, 100, 200));
        rs.insert_slot(slot(3, 200, 300));
        let starts: Vec<Ms> = rs.slots.iter().map(|s| s.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn remove_middle_preserves_order() {
        let mut rs = state();
        for (id, start) in [(1, 0), (2, 100), (3, 200)] {
            rs.insert_slot(slot(id, start, start + 50));
        }
        assert_eq!(rs.remove_slot(2).map(|s| s.id), Some(2));
        assert_eq!(rs.remove_slot(42), None);
        let ids: Vec<Id> = rs.slots.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = state();
        rs.insert_slot(slot(1, 100, 200));
        rs.insert_slot(slot(2, 450, 600));
        rs.insert_slot(slot(3, 1000, 1100));

        let hits: Vec<Id> = rs.overlapping(&Span::new(500, 800)).map(|s| s.id).collect();
        assert_eq!(hits, vec![2]);
    }

    #[test]
    fn touching_slots_do_not_overlap() {
        let mut rs = state();
        rs.insert_slot(slot(1, 100, 200));
        assert_eq!(rs.overlapping(&Span::new(200, 300)).count(), 0);
        assert_eq!(rs.overlapping(&Span::new(0, 100)).count(), 0);
        assert_eq!(rs.overlapping(&Span::new(199, 300)).count(), 1);
    }

    #[test]
    fn long_slot_spanning_query_is_found() {
        let mut rs = state();
        rs.insert_slot(slot(1, 0, 10_000));
        assert_eq!(rs.overlapping(&Span::new(500, 600)).count(), 1);
    }

    #[test]
    fn first_overlap_honours_exclusion() {
        let mut rs = state();
        rs.insert_slot(slot(1, 100, 200));
        let query = Span::new(150, 250);
        assert_eq!(rs.first_overlap(&query, None).map(|s| s.id), Some(1));
        assert_eq!(rs.first_overlap(&query, Some(1)), None);
    }
}
