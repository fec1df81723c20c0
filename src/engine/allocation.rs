use crate::model::{Ms, PropertyState};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Whether a property can satisfy an allocation request: size matches,
/// the mode's listing flag is set, and no live claim holds it. Expired
/// claims do not count — the reaper clears them lazily.
pub(crate) fn matches_request(
    property: &PropertyState,
    capacity: u8,
    to_rent: bool,
    now: Ms,
) -> bool {
    property.capacity == capacity && property.available(to_rent, now)
}
