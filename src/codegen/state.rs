/// Name counters for one compilation. Every generated temporary and label
/// draws from here, so names are unique across the whole C file and the
/// output depends only on the input module.
#[derive(Debug, Default)]
pub struct GenState {
    next_temp: usize,
    next_label: usize,
}

impl GenState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temp(&mut self) -> String {
        self.next_temp += 1;
        format!("pcc_t{}", self.next_temp)
    }

    /// Returns the numeric suffix shared by a group of related labels.
    pub fn label_id(&mut self) -> usize {
        self.next_label += 1;
        self.next_label
    }

    pub fn temps_issued(&self) -> usize {
        self.next_temp
    }
}

pub fn label(kind: &str, id: usize) -> String {
    format!("pcc_L_{kind}_{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic() {
        let mut state = GenState::new();
        assert_eq!(state.temp(), "pcc_t1");
        assert_eq!(state.temp(), "pcc_t2");
        let id = state.label_id();
        assert_eq!(label("while", id), "pcc_L_while_1");
        assert_eq!(state.label_id(), 2);
        assert_eq!(state.temps_issued(), 2);
    }
}
