//! Byte-level finite automata for term intersection.
//!
//! [`Automaton`] is a nondeterministic automaton over bytes with range
//! transitions and no epsilon moves. Builders cover literals, prefixes and
//! wildcard patterns; [`Automaton::determinize`] turns any of them into a
//! DFA, and [`CompiledAutomaton`] packs a DFA into a run table for the
//! dictionary intersector.

mod compiled;

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

pub use compiled::CompiledAutomaton;

/// Transition on every byte in `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transition {
    pub min: u8,
    pub max: u8,
    pub dest: usize,
}

impl Transition {
    pub fn new(min: u8, max: u8, dest: usize) -> Self {
        debug_assert!(min <= max);
        Self { min, max, dest }
    }

    pub fn contains(&self, byte: u8) -> bool {
        self.min <= byte && byte <= self.max
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct State {
    accept: bool,
    transitions: Vec<Transition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Automaton {
    states: Vec<State>,
    initial: usize,
}

impl Default for Automaton {
    /// The empty language.
    fn default() -> Self {
        Self {
            states: vec![State::default()],
            initial: 0,
        }
    }
}

impl Automaton {
    /// An automaton with a single non-accepting state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self, accept: bool) -> usize {
        self.states.push(State {
            accept,
            transitions: Vec::new(),
        });
        self.states.len() - 1
    }

    pub fn add_transition(&mut self, from: usize, min: u8, max: u8, dest: usize) {
        self.states[from].transitions.push(Transition::new(min, max, dest));
    }

    pub fn set_accept(&mut self, state: usize, accept: bool) {
        self.states[state].accept = accept;
    }

    pub fn initial_state(&self) -> usize {
        self.initial
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn is_accept(&self, state: usize) -> bool {
        self.states[state].accept
    }

    pub fn transitions(&self, state: usize) -> &[Transition] {
        &self.states[state].transitions
    }

    /// Exactly `bytes`.
    pub fn literal(bytes: &[u8]) -> Self {
        let mut automaton = Self::new();
        let mut state = automaton.initial;
        for &b in bytes {
            let next = automaton.add_state(false);
            automaton.add_transition(state, b, b, next);
            state = next;
        }
        automaton.set_accept(state, true);
        automaton
    }

    /// Every byte string starting with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        let mut automaton = Self::literal(prefix);
        let last = automaton.states.len() - 1;
        automaton.add_transition(last, 0, 255, last);
        automaton
    }

    /// Every byte string, including the empty one.
    pub fn any_string() -> Self {
        Self::prefix(b"")
    }

    /// Wildcard pattern: `*` matches any sequence, `?` one UTF-8 encoded
    /// character, and `\` escapes the next character.
    pub fn wildcard(pattern: &str) -> Self {
        let mut automaton = Self::new();
        let mut state = automaton.initial;
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => automaton.add_transition(state, 0, 255, state),
                '?' => state = automaton.add_any_char(state),
                '\\' => {
                    let escaped = chars.next().unwrap_or('\\');
                    state = automaton.add_char(state, escaped);
                }
                c => state = automaton.add_char(state, c),
            }
        }
        automaton.set_accept(state, true);
        automaton
    }

    fn add_char(&mut self, mut state: usize, c: char) -> usize {
        let mut buf = [0u8; 4];
        for &b in c.encode_utf8(&mut buf).as_bytes() {
            let next = self.add_state(false);
            self.add_transition(state, b, b, next);
            state = next;
        }
        state
    }

    /// One UTF-8 sequence of 1 to 4 bytes.
    fn add_any_char(&mut self, from: usize) -> usize {
        let end = self.add_state(false);
        self.add_transition(from, 0x00, 0x7f, end);
        let mut continuation = end;
        // lead bytes for 2, 3 and 4 byte sequences need 1, 2 and 3 continuations
        for (lead_min, lead_max) in [(0xc2u8, 0xdfu8), (0xe0, 0xef), (0xf0, 0xf4)] {
            let lead = self.add_state(false);
            self.add_transition(lead, 0x80, 0xbf, continuation);
            self.add_transition(from, lead_min, lead_max, lead);
            continuation = lead;
        }
        end
    }

    /// Accepts what any of `automata` accepts.
    pub fn union(automata: &[Automaton]) -> Self {
        let mut result = Self::new();
        for automaton in automata {
            let offset = result.states.len();
            result.states.extend(automaton.states.iter().map(|s| State {
                accept: s.accept,
                transitions: s
                    .transitions
                    .iter()
                    .map(|t| Transition::new(t.min, t.max, t.dest + offset))
                    .collect(),
            }));
            let initial = automaton.initial + offset;
            let copied = result.states[initial].clone();
            let root = result.initial;
            result.states[root].accept |= copied.accept;
            result.states[root].transitions.extend(copied.transitions);
        }
        result
    }

    /// Accepts the reversal of every accepted string.
    pub fn reverse(&self) -> Self {
        let mut reversed = Self::new();
        reversed
            .states
            .resize(self.states.len() + 1, State::default());
        // old state i is new state i + 1; new initial 0 stands for all old accept states
        for (from, state) in self.states.iter().enumerate() {
            for t in &state.transitions {
                reversed.add_transition(t.dest + 1, t.min, t.max, from + 1);
            }
        }
        for (i, state) in self.states.iter().enumerate() {
            if state.accept {
                let transitions = reversed.states[i + 1].transitions.clone();
                reversed.states[0].transitions.extend(transitions);
                if i == self.initial {
                    reversed.states[0].accept = true;
                }
            }
        }
        reversed.states[self.initial + 1].accept = true;
        reversed
    }

    /// Subset construction. The result has sorted, non-overlapping,
    /// maximally merged transitions and only reachable states.
    pub fn determinize(&self) -> Self {
        let start: Vec<usize> = vec![self.initial];
        let mut ids: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
        let mut sets: Vec<Vec<usize>> = Vec::new();
        let mut dfa = Automaton { states: Vec::new(), initial: 0 };

        ids.insert(start.clone(), 0);
        sets.push(start);
        dfa.states.push(State::default());

        let mut next = 0;
        while next < sets.len() {
            let set = sets[next].clone();
            dfa.states[next].accept = set.iter().any(|&s| self.states[s].accept);

            let mut points = BTreeSet::new();
            for &s in &set {
                for t in &self.states[s].transitions {
                    points.insert(t.min as u16);
                    points.insert(t.max as u16 + 1);
                }
            }
            let points: Vec<u16> = points.into_iter().collect();

            let mut transitions: Vec<Transition> = Vec::new();
            for window in points.windows(2) {
                let (lo, hi) = (window[0] as u8, (window[1] - 1) as u8);
                let dest_set: Vec<usize> = set
                    .iter()
                    .flat_map(|&s| self.states[s].transitions.iter())
                    .filter(|t| t.contains(lo))
                    .map(|t| t.dest)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if dest_set.is_empty() {
                    continue;
                }
                let dest = match ids.get(&dest_set) {
                    Some(&id) => id,
                    None => {
                        let id = sets.len();
                        ids.insert(dest_set.clone(), id);
                        sets.push(dest_set);
                        dfa.states.push(State::default());
                        id
                    }
                };
                match transitions.last_mut() {
                    Some(last) if last.dest == dest && last.max as u16 + 1 == lo as u16 => {
                        last.max = hi;
                    }
                    _ => transitions.push(Transition::new(lo, hi, dest)),
                }
            }
            dfa.states[next].transitions = transitions;
            next += 1;
        }
        dfa
    }

    /// Drop states that cannot reach an accept state, renumbering the rest.
    /// The initial state is always kept.
    pub fn remove_dead_states(&self) -> Self {
        let mut reverse_edges: Vec<Vec<usize>> = vec![Vec::new(); self.states.len()];
        for (from, state) in self.states.iter().enumerate() {
            for t in &state.transitions {
                reverse_edges[t.dest].push(from);
            }
        }
        let mut live = vec![false; self.states.len()];
        let mut stack: Vec<usize> = (0..self.states.len()).filter(|&s| self.states[s].accept).collect();
        for &s in &stack {
            live[s] = true;
        }
        while let Some(s) = stack.pop() {
            for &from in &reverse_edges[s] {
                if !live[from] {
                    live[from] = true;
                    stack.push(from);
                }
            }
        }

        let mut remap = vec![usize::MAX; self.states.len()];
        let mut result = Automaton { states: Vec::new(), initial: 0 };
        let order = std::iter::once(self.initial).chain((0..self.states.len()).filter(|&s| s != self.initial));
        for s in order {
            if live[s] || s == self.initial {
                remap[s] = result.states.len();
                result.states.push(State {
                    accept: self.states[s].accept,
                    transitions: Vec::new(),
                });
            }
        }
        for (s, state) in self.states.iter().enumerate() {
            if remap[s] == usize::MAX {
                continue;
            }
            result.states[remap[s]].transitions = state
                .transitions
                .iter()
                .filter(|t| live[t.dest])
                .map(|t| Transition::new(t.min, t.max, remap[t.dest]))
                .collect();
        }
        result
    }

    /// Longest byte string every accepted string starts with. Expects a DFA
    /// without dead states.
    pub fn common_prefix(&self) -> Vec<u8> {
        let mut prefix = Vec::new();
        let mut visited = vec![false; self.states.len()];
        let mut state = self.initial;
        loop {
            visited[state] = true;
            let s = &self.states[state];
            match s.transitions.as_slice() {
                [t] if !s.accept && t.min == t.max && !visited[t.dest] => {
                    prefix.push(t.min);
                    state = t.dest;
                }
                _ => return prefix,
            }
        }
    }

    /// Run a DFA or NFA over `input`.
    pub fn run(&self, input: &[u8]) -> bool {
        let mut current = vec![self.initial];
        for &b in input {
            let next: BTreeSet<usize> = current
                .iter()
                .flat_map(|&s| self.states[s].transitions.iter())
                .filter(|t| t.contains(b))
                .map(|t| t.dest)
                .collect();
            if next.is_empty() {
                return false;
            }
            current = next.into_iter().collect();
        }
        current.iter().any(|&s| self.states[s].accept)
    }
}
