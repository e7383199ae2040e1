#![no_main]

use libfuzzer_sys::fuzz_target;
use sluice_core::subject_matches;
use sluice_node::SubjectMatcher;

const TOKENS: [&str; 5] = ["a", "b", "c", "*", ">"];

fn subject_from(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| TOKENS[usize::from(*b) % TOKENS.len()])
        .collect::<Vec<_>>()
        .join(".")
}

// Each chunk is an op byte, a handle byte and up to four token bytes.
fuzz_target!(|data: &[u8]| {
    let matcher = SubjectMatcher::with_cache_capacity(8);
    let baseline = matcher.node_count();
    let mut live: Vec<(String, u8)> = Vec::new();

    for chunk in data.chunks(6) {
        let [op, handle, rest @ ..] = chunk else {
            continue;
        };
        let pattern = subject_from(rest);
        match op % 3 {
            0 => {
                if matcher.insert(&pattern, *handle).is_ok() {
                    live.push((pattern, *handle));
                }
            }
            1 => {
                let pos = live.iter().position(|(p, h)| *p == pattern && h == handle);
                assert_eq!(matcher.remove(&pattern, handle), pos.is_some());
                if let Some(pos) = pos {
                    live.swap_remove(pos);
                }
            }
            _ => {
                if !pattern.contains('*') && !pattern.contains('>') && !pattern.is_empty() {
                    let mut got = matcher.matches(&pattern);
                    got.sort_unstable();
                    let mut want: Vec<u8> = live
                        .iter()
                        .filter(|(p, _)| subject_matches(p, &pattern))
                        .map(|(_, h)| *h)
                        .collect();
                    want.sort_unstable();
                    want.dedup();
                    assert_eq!(got, want);
                }
            }
        }
        assert_eq!(matcher.count(), live.len());
    }

    for (pattern, handle) in &live {
        assert!(matcher.remove(pattern, handle));
    }
    assert_eq!(matcher.node_count(), baseline);
});
