//! The closed set of rebinding strategies. Each one maps the current session
//! state to an ordered list of answers; only round-robin mutates anything.
use log::debug;
use rand::Rng;

use crate::qname::AnswerIp;
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebindStrategy {
    /// Internal fallback: always the attacker address.
    First,
    /// Attacker address first, then the target for every query that follows
    /// within the rebound timeout.
    FirstThenSecond,
    /// A coin toss between the two addresses on every query.
    Random,
    /// Attacker / target alternating, driven by the session phase.
    RoundRobin,
    /// Both addresses in one answer; the browser picks whichever connects.
    MultiA,
}

impl RebindStrategy {
    /// Registry lookup by the token carried in the query name. Unknown or
    /// empty tokens yield `None` and the caller falls back to the configured
    /// default.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "fromqueryfirstthensecond" => Some(RebindStrategy::FirstThenSecond),
            "fromqueryrandom" => Some(RebindStrategy::Random),
            "fromqueryroundrobin" => Some(RebindStrategy::RoundRobin),
            "fromquerymultia" => Some(RebindStrategy::MultiA),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RebindStrategy::First => "first",
            RebindStrategy::FirstThenSecond => "fromqueryfirstthensecond",
            RebindStrategy::Random => "fromqueryrandom",
            RebindStrategy::RoundRobin => "fromqueryroundrobin",
            RebindStrategy::MultiA => "fromquerymultia",
        }
    }

    /// Produce the answers for one query against the session's state.
    pub fn answers(&self, store: &SessionStore, session_id: &str) -> Vec<AnswerIp> {
        let session = match store.snapshot(session_id) {
            Some(session) => session,
            None => {
                debug!("strategy invoked for unknown session <{}>", session_id);
                return Vec::new();
            }
        };

        match self {
            RebindStrategy::First => vec![session.response_ip],

            RebindStrategy::FirstThenSecond => {
                if session.cache_flush {
                    return vec![session.response_ip];
                }
                // both timestamps still carry the previous query's arrival;
                // a session without a completed query has neither
                match (session.current_query_at, session.last_query_at) {
                    (Some(current), Some(last)) => {
                        if current.duration_since(last) < session.rebound_timeout {
                            vec![session.rebound_ip]
                        } else {
                            vec![session.response_ip]
                        }
                    }
                    _ => vec![session.response_ip],
                }
            }

            RebindStrategy::Random => {
                if session.cache_flush {
                    return vec![session.response_ip];
                }
                if rand::thread_rng().gen::<bool>() {
                    vec![session.response_ip]
                } else {
                    vec![session.rebound_ip]
                }
            }

            RebindStrategy::RoundRobin => {
                if session.cache_flush {
                    return vec![session.response_ip];
                }
                // advance the phase under the write lock, then answer by the
                // new phase: 1 is the attacker, 2 the target
                let answer = store.with_mut(session_id, |session| {
                    session.round_robin_phase = match session.round_robin_phase {
                        0 => 1,
                        1 => 2,
                        _ => 1,
                    };
                    if session.round_robin_phase == 1 {
                        session.response_ip
                    } else {
                        session.rebound_ip
                    }
                });
                answer.map(|a| vec![a]).unwrap_or_default()
            }

            // cache flush does not apply here: the whole point is handing
            // the browser both addresses at once
            RebindStrategy::MultiA => vec![session.response_ip, session.rebound_ip],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn ip(s: &str) -> AnswerIp {
        s.parse().unwrap()
    }

    fn seeded_store(id: &str) -> SessionStore {
        let store = SessionStore::new();
        store.upsert(id, ip("1.2.3.4"), ip("10.0.0.7"), false, TIMEOUT);
        store
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(
            RebindStrategy::from_name("fromquerymultia"),
            Some(RebindStrategy::MultiA)
        );
        assert_eq!(RebindStrategy::from_name(""), None);
        assert_eq!(RebindStrategy::from_name("bogus"), None);

        for strategy in [
            RebindStrategy::FirstThenSecond,
            RebindStrategy::Random,
            RebindStrategy::RoundRobin,
            RebindStrategy::MultiA,
        ] {
            assert_eq!(RebindStrategy::from_name(strategy.name()), Some(strategy));
        }
    }

    #[test]
    fn first_always_answers_attacker() {
        let store = seeded_store("s");
        assert_eq!(RebindStrategy::First.answers(&store, "s"), vec![ip("1.2.3.4")]);
        store.touch("s", Instant::now());
        assert_eq!(RebindStrategy::First.answers(&store, "s"), vec![ip("1.2.3.4")]);
    }

    #[test]
    fn first_then_second_rebinds_within_timeout() {
        let store = seeded_store("s");
        let strategy = RebindStrategy::FirstThenSecond;

        // fresh session: no completed query yet, attacker wins
        assert_eq!(strategy.answers(&store, "s"), vec![ip("1.2.3.4")]);
        store.touch("s", Instant::now());

        // next query lands well within the timeout window
        assert_eq!(strategy.answers(&store, "s"), vec![ip("10.0.0.7")]);
    }

    #[test]
    fn first_then_second_cache_flush_short_circuits() {
        let store = seeded_store("s");
        store.touch("s", Instant::now());
        store.with_mut("s", |s| s.cache_flush = true);

        assert_eq!(
            RebindStrategy::FirstThenSecond.answers(&store, "s"),
            vec![ip("1.2.3.4")]
        );
    }

    #[test]
    fn round_robin_alternates() {
        let store = seeded_store("s");
        let strategy = RebindStrategy::RoundRobin;

        let sequence: Vec<_> = (0..4).flat_map(|_| strategy.answers(&store, "s")).collect();
        assert_eq!(
            sequence,
            vec![ip("1.2.3.4"), ip("10.0.0.7"), ip("1.2.3.4"), ip("10.0.0.7")]
        );

        // phase never returns to the pre-first-rebind sentinel
        assert_eq!(store.snapshot("s").unwrap().round_robin_phase, 2);
    }

    #[test]
    fn random_answers_one_of_the_pair() {
        let store = seeded_store("s");

        for _ in 0..32 {
            let answers = RebindStrategy::Random.answers(&store, "s");
            assert_eq!(answers.len(), 1);
            assert!(answers[0] == ip("1.2.3.4") || answers[0] == ip("10.0.0.7"));
        }
    }

    #[test]
    fn multi_a_always_answers_both() {
        let store = seeded_store("s");
        store.with_mut("s", |s| s.cache_flush = true);

        let answers = RebindStrategy::MultiA.answers(&store, "s");
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0], ip("1.2.3.4"));
        assert_eq!(answers[1], ip("10.0.0.7"));
    }

    #[test]
    fn unknown_session_answers_nothing() {
        let store = SessionStore::new();
        assert!(RebindStrategy::First.answers(&store, "ghost").is_empty());
    }
}
