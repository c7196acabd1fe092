//! DFA packed into a byte-indexed run table.

use super::{Automaton, Transition};

const DEAD: u32 = u32::MAX;

/// A deterministic automaton ready for matching.
///
/// Every state has a 256-entry row in the run table, sorted transitions for
/// range skipping, and the automaton knows the suffix all accepted strings
/// share so the intersector can reject terms without stepping.
#[derive(Debug, Clone)]
pub struct CompiledAutomaton {
    dfa: Automaton,
    table: Vec<u32>,
    accept: Vec<bool>,
    common_suffix: Option<Vec<u8>>,
}

impl CompiledAutomaton {
    pub fn new(automaton: &Automaton) -> Self {
        let dfa = automaton.determinize().remove_dead_states();
        let num_states = dfa.num_states();

        let mut table = vec![DEAD; num_states * 256];
        for state in 0..num_states {
            let row = &mut table[state * 256..(state + 1) * 256];
            for t in dfa.transitions(state) {
                for b in t.min..=t.max {
                    row[b as usize] = t.dest as u32;
                }
            }
        }
        let accept = (0..num_states).map(|s| dfa.is_accept(s)).collect();

        let reversed = dfa.reverse().determinize().remove_dead_states();
        let mut suffix = reversed.common_prefix();
        suffix.reverse();
        let common_suffix = (!suffix.is_empty()).then_some(suffix);

        log::trace!(
            "compiled automaton: {} states, common suffix {:?}",
            num_states,
            common_suffix.as_deref().map(String::from_utf8_lossy)
        );

        Self {
            dfa,
            table,
            accept,
            common_suffix,
        }
    }

    pub fn initial_state(&self) -> usize {
        self.dfa.initial_state()
    }

    /// Next state on `byte`, or `None` for the dead state.
    #[inline]
    pub fn step(&self, state: usize, byte: u8) -> Option<usize> {
        match self.table[state * 256 + byte as usize] {
            DEAD => None,
            next => Some(next as usize),
        }
    }

    #[inline]
    pub fn is_accept(&self, state: usize) -> bool {
        self.accept[state]
    }

    /// Transitions of `state` in ascending byte order, non-overlapping.
    pub fn sorted_transitions(&self, state: usize) -> &[Transition] {
        self.dfa.transitions(state)
    }

    pub fn run(&self, input: &[u8]) -> bool {
        let mut state = self.initial_state();
        for &b in input {
            match self.step(state, b) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_accept(state)
    }

    pub fn common_suffix(&self) -> Option<&[u8]> {
        self.common_suffix.as_deref()
    }

    pub fn num_states(&self) -> usize {
        self.dfa.num_states()
    }
}

impl From<Automaton> for CompiledAutomaton {
    fn from(automaton: Automaton) -> Self {
        Self::new(&automaton)
    }
}

/// Lets a compiled automaton drive searches over any `fst` map or set.
impl fst::Automaton for CompiledAutomaton {
    type State = Option<usize>;

    fn start(&self) -> Option<usize> {
        Some(self.initial_state())
    }

    fn is_match(&self, state: &Option<usize>) -> bool {
        state.is_some_and(|s| self.is_accept(s))
    }

    fn can_match(&self, state: &Option<usize>) -> bool {
        state.is_some()
    }

    fn accept(&self, state: &Option<usize>, byte: u8) -> Option<usize> {
        state.and_then(|s| self.step(s, byte))
    }
}
