use serde::Serialize;

use crate::fetch::FetchState;

/// What a panel renders. Loading, empty and failed are never conflated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum Panel<T> {
    Loading,
    Empty { message: String },
    Failed { message: String },
    Ready(T),
}

pub trait IsEmpty {
    fn is_empty_payload(&self) -> bool;
}

impl<T> IsEmpty for Vec<T> {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl IsEmpty for u64 {
    // A zero count is still a number worth showing.
    fn is_empty_payload(&self) -> bool {
        false
    }
}

impl IsEmpty for crate::aggregate::ChartSeries {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl<T: IsEmpty> Panel<T> {
    /// `Idle` renders as `Loading`: a slot nobody has fetched yet is about
    /// to be.
    pub fn from_state(state: FetchState<T>, empty_message: &str) -> Self {
        match state {
            FetchState::Idle | FetchState::Loading => Panel::Loading,
            FetchState::Failed(e) => Panel::Failed { message: e.to_string() },
            FetchState::Success(v) if v.is_empty_payload() => {
                Panel::Empty { message: empty_message.to_string() }
            }
            FetchState::Success(v) => Panel::Ready(v),
        }
    }
}

impl<T> Panel<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Panel::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Panel::Loading => "loading",
            Panel::Empty { .. } => "empty",
            Panel::Failed { .. } => "failed",
            Panel::Ready(_) => "ready",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;

    #[test]
    fn test_three_states_distinct() {
        let loading: Panel<Vec<u8>> = Panel::from_state(FetchState::Loading, "none");
        let empty = Panel::from_state(FetchState::Success(Vec::<u8>::new()), "No events found");
        let failed: Panel<Vec<u8>> = Panel::from_state(FetchState::Failed(FetchError::http(500)), "none");
        assert_eq!(loading, Panel::Loading);
        assert_eq!(empty, Panel::Empty { message: "No events found".to_string() });
        assert!(matches!(failed, Panel::Failed { ref message } if message.contains("500")));
        assert_ne!(loading.label(), empty.label());
        assert_ne!(empty.label(), failed.label());
    }

    #[test]
    fn test_idle_is_loading_and_zero_count_ready() {
        assert_eq!(Panel::<u64>::from_state(FetchState::Idle, ""), Panel::Loading);
        assert_eq!(Panel::from_state(FetchState::Success(0u64), "").ready(), Some(&0));
    }
}
