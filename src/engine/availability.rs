use crate::model::*;

use super::calendar::ResourceCalendar;

/// Free sub-windows of `window` across every supplied calendar: the window
/// minus the union of their busy spans.
pub fn free_windows(window: &Span, calendars: &[ResourceCalendar]) -> Vec<Span> {
    let mut busy: Vec<Span> = calendars
        .iter()
        .flat_map(|cal| cal.busy_within(window))
        .collect();
    if busy.is_empty() {
        return vec![*window];
    }
    busy.sort_by_key(|s| s.start);
    subtract_intervals(&[*window], &merge_overlapping(&busy))
}

/// Merge sorted overlapping or touching spans into disjoint spans.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// `base` minus `to_remove`; both sorted by start, `to_remove` disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for b in base {
        let mut cursor = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        for r in to_remove[ri..].iter().take_while(|r| r.start < b.end) {
            if r.start > cursor {
                result.push(Span::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
        }

        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;

    fn cal(spans: &[(Ms, Ms)]) -> ResourceCalendar {
        let mut c = ResourceCalendar::new(ResourceRef::aircraft(Ulid::new()));
        for &(s, e) in spans {
            c.insert(Ulid::new(), Span::new(s, e));
        }
        c
    }

    #[test]
    fn subtract_touching_leaves_base() {
        let base = vec![Span::new(8 * H, 9 * H), Span::new(10 * H, 11 * H)];
        let result = subtract_intervals(&base, &[Span::new(9 * H, 10 * H)]);
        assert_eq!(result, base);
    }

    #[test]
    fn subtract_covering_removes_all() {
        let result = subtract_intervals(&[Span::new(9 * H, 10 * H)], &[Span::new(8 * H, 11 * H)]);
        assert!(result.is_empty());
    }

    #[test]
    fn subtract_punches_holes() {
        let result = subtract_intervals(
            &[Span::new(8 * H, 18 * H)],
            &[Span::new(9 * H, 10 * H), Span::new(12 * H, 13 * H + 30 * M)],
        );
        assert_eq!(
            result,
            vec![
                Span::new(8 * H, 9 * H),
                Span::new(10 * H, 12 * H),
                Span::new(13 * H + 30 * M, 18 * H),
            ]
        );
    }

    #[test]
    fn subtract_carries_removal_across_bases() {
        let result = subtract_intervals(
            &[Span::new(0, 100), Span::new(150, 300)],
            &[Span::new(50, 200)],
        );
        assert_eq!(result, vec![Span::new(0, 50), Span::new(200, 300)]);
    }

    #[test]
    fn merge_joins_overlap_and_touch() {
        let merged = merge_overlapping(&[
            Span::new(100, 300),
            Span::new(200, 400),
            Span::new(400, 450),
            Span::new(500, 600),
        ]);
        assert_eq!(merged, vec![Span::new(100, 450), Span::new(500, 600)]);
    }

    #[test]
    fn free_windows_across_resources() {
        let instructor = cal(&[(9 * H, 10 * H)]);
        let aircraft = cal(&[(9 * H + 30 * M, 11 * H), (15 * H, 16 * H)]);
        let free = free_windows(&Span::new(8 * H, 18 * H), &[instructor, aircraft]);
        assert_eq!(
            free,
            vec![Span::new(8 * H, 9 * H), Span::new(11 * H, 15 * H), Span::new(16 * H, 18 * H)]
        );
    }

    #[test]
    fn free_windows_without_bookings_is_whole_window() {
        let window = Span::new(8 * H, 18 * H);
        assert_eq!(free_windows(&window, &[cal(&[])]), vec![window]);
        assert_eq!(free_windows(&window, &[]), vec![window]);
    }
}
