use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{PodConfig, TopologySnapshot};
use crate::error::Error;

/// Sentinel keys that carry runtime state we do not use.
const IGNORED_SENTINEL_KEYS: &[&str] = &[
    "config-epoch",
    "leader-epoch",
    "current-epoch",
    "down-after-milliseconds",
    "known-sentinel",
    "known-slave",
];

/// One recognised line of a Sentinel configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `sentinel monitor <name> <ip> <port> <quorum>`
    Monitor(PodConfig),
    /// `sentinel auth-pass <name> <token>`
    AuthPass { name: String, token: String },
    /// A known `sentinel <key> ...` line that is deliberately not interpreted.
    Ignored(String),
    Port(u16),
    Dir(PathBuf),
    Bind(String),
}

/// Why a single line was skipped.  Never aborts a parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("unhandled directive `{0}`")]
    Unknown(String),

    #[error("unhandled sentinel directive `{0}`")]
    UnknownSentinel(String),

    #[error("`{directive}` expects {expected} argument(s), got {got}")]
    Arity {
        directive: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("`{directive}` has invalid {field} `{value}`")]
    InvalidNumber {
        directive: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

impl Directive {
    /// Parse one line.  `Ok(None)` for blank lines and `#` comments.
    pub fn parse(line: &str) -> Result<Option<Self>, DirectiveError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (head, args) = (tokens[0], &tokens[1..]);

        let directive = match head {
            "sentinel" => Self::parse_sentinel(args)?,
            "port" => {
                at_least("port", args, 1)?;
                Self::Port(number("port", "port", args[0])?)
            }
            "dir" => {
                at_least("dir", args, 1)?;
                Self::Dir(PathBuf::from(unquote(args[0])))
            }
            "bind" => {
                at_least("bind", args, 1)?;
                Self::Bind(args[0].to_string())
            }
            other => return Err(DirectiveError::Unknown(other.to_string())),
        };
        Ok(Some(directive))
    }

    fn parse_sentinel(args: &[&str]) -> Result<Self, DirectiveError> {
        let Some((&key, rest)) = args.split_first() else {
            return Err(DirectiveError::Arity {
                directive: "sentinel",
                expected: 1,
                got: 0,
            });
        };

        match key {
            "monitor" => {
                exactly("sentinel monitor", rest, 4)?;
                let port = number("sentinel monitor", "port", rest[2])?;
                let quorum = number("sentinel monitor", "quorum", rest[3])?;
                Ok(Self::Monitor(PodConfig::new(rest[0], rest[1], port, quorum)))
            }
            "auth-pass" => {
                exactly("sentinel auth-pass", rest, 2)?;
                Ok(Self::AuthPass {
                    name: rest[0].to_string(),
                    token: unquote(rest[1]).to_string(),
                })
            }
            k if IGNORED_SENTINEL_KEYS.contains(&k) => Ok(Self::Ignored(k.to_string())),
            other => Err(DirectiveError::UnknownSentinel(other.to_string())),
        }
    }
}

fn exactly(directive: &'static str, args: &[&str], expected: usize) -> Result<(), DirectiveError> {
    if args.len() != expected {
        return Err(DirectiveError::Arity {
            directive,
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn at_least(directive: &'static str, args: &[&str], expected: usize) -> Result<(), DirectiveError> {
    if args.len() < expected {
        return Err(DirectiveError::Arity {
            directive,
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn number<T: std::str::FromStr>(
    directive: &'static str,
    field: &'static str,
    value: &str,
) -> Result<T, DirectiveError> {
    value.parse().map_err(|_| DirectiveError::InvalidNumber {
        directive,
        field,
        value: value.to_string(),
    })
}

/// Sentinel rewrites some values wrapped in double quotes.
fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Parse a whole configuration stream into a fresh snapshot.
///
/// Bad lines are logged and skipped; only an I/O error stops the parse.
pub fn parse<R: BufRead>(mut reader: R) -> io::Result<TopologySnapshot> {
    let mut topology = TopologySnapshot::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;

        let parsed = std::str::from_utf8(&buf)
            .map_err(|_| DirectiveError::InvalidUtf8)
            .and_then(Directive::parse);
        match parsed {
            Ok(Some(directive)) => topology.apply(directive),
            Ok(None) => {}
            Err(e) => tracing::warn!(line = line_no, error = %e, "skipping config line"),
        }
    }

    Ok(topology)
}

/// Blocking load from a file path.
pub fn load(path: &Path) -> Result<TopologySnapshot, Error> {
    let config_err = |source| Error::ConfigFile {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(config_err)?;
    parse(BufReader::new(file)).map_err(config_err)
}

/// Async load used by the monitor loop.
pub async fn load_async(path: &Path) -> Result<TopologySnapshot, Error> {
    let config_err = |source| Error::ConfigFile {
        path: path.to_path_buf(),
        source,
    };
    let bytes = tokio::fs::read(path).await.map_err(config_err)?;
    parse(bytes.as_slice()).map_err(config_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(text: &str) -> TopologySnapshot {
        parse(text.as_bytes()).unwrap()
    }

    #[test]
    fn monitor_with_auth_pass() {
        let topo = parse_str(
            "sentinel monitor mymaster 127.0.0.1 6379 2\n\
             sentinel auth-pass mymaster secret\n",
        );

        assert_eq!(topo.len(), 1);
        let pod = topo.pods.get("mymaster").unwrap();
        assert_eq!(pod.name, "mymaster");
        assert_eq!(pod.ip, "127.0.0.1");
        assert_eq!(pod.port, 6379);
        assert_eq!(pod.quorum, 2);
        assert_eq!(pod.auth_token.as_deref(), Some("secret"));
        assert_eq!(pod.address(), "127.0.0.1:6379");
    }

    #[test]
    fn unknown_directive_does_not_abort() {
        let topo = parse_str(
            "maxclients 4064\n\
             sentinel monitor cache 10.0.0.5 6380 3\n",
        );
        assert_eq!(topo.pods.get("cache").unwrap().port, 6380);
    }

    #[test]
    fn non_utf8_line_is_skipped() {
        let topo = parse(
            &b"# maintained by ops \xe9quipe\n\
               sentinel monitor mymaster 127.0.0.1 6379 2\n\
               sentinel auth-pass mymaster caf\xe9\n"[..],
        )
        .unwrap();
        let pod = topo.pods.get("mymaster").unwrap();
        assert_eq!(pod.port, 6379);
        assert_eq!(pod.auth_token, None);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let topo = parse_str(
            "sentinel monitor short 10.0.0.1 6379\n\
             sentinel monitor badport 10.0.0.1 sixtythree 2\n\
             sentinel bogus-key x\n\
             sentinel\n\
             sentinel monitor good 10.0.0.2 6379 2\n",
        );
        assert_eq!(topo.pods.keys().collect::<Vec<_>>(), vec!["good"]);
    }

    #[test]
    fn comments_blank_lines_and_ignored_keys() {
        let topo = parse_str(
            "# Generated by CONFIG REWRITE\n\
             \n\
             sentinel monitor p1 10.1.1.1 6379 2\n\
             sentinel config-epoch p1 4\n\
             sentinel leader-epoch p1 4\n\
             sentinel known-slave p1 10.1.1.2 6379\n\
             sentinel known-sentinel p1 10.1.1.9 26379 0123abcd\n\
             sentinel down-after-milliseconds p1 5000\n\
             sentinel current-epoch 4\n",
        );
        assert_eq!(topo.len(), 1);
        assert!(topo.pods.get("p1").unwrap().sentinels.is_empty());
    }

    #[test]
    fn local_sentinel_settings_are_recorded() {
        let topo = parse_str("port 26379\ndir \"/var/lib/redis\"\nbind 0.0.0.0 ::1\n");
        assert_eq!(topo.port, Some(26379));
        assert_eq!(topo.dir, Some(PathBuf::from("/var/lib/redis")));
        assert_eq!(topo.bind.as_deref(), Some("0.0.0.0"));
        assert!(topo.is_empty());
    }

    #[test]
    fn auth_pass_for_unknown_pod_is_a_no_op() {
        let topo = parse_str("sentinel auth-pass ghost hunter2\n");
        assert!(topo.is_empty());
    }

    #[test]
    fn auth_pass_before_monitor_is_lost() {
        let topo = parse_str(
            "sentinel auth-pass late pw\n\
             sentinel monitor late 10.0.0.3 6379 1\n",
        );
        assert_eq!(topo.pods.get("late").unwrap().auth_token, None);
    }

    #[test]
    fn duplicate_name_keeps_first() {
        let topo = parse_str(
            "sentinel monitor dup 10.0.0.1 6379 2\n\
             sentinel monitor dup 10.0.0.9 6390 5\n",
        );
        let pod = topo.pods.get("dup").unwrap();
        assert_eq!(pod.address(), "10.0.0.1:6379");
        assert_eq!(pod.quorum, 2);
    }

    #[test]
    fn shared_address_under_two_names_keeps_both() {
        let topo = parse_str(
            "sentinel monitor a 10.0.0.1 6379 2\n\
             sentinel monitor b 10.0.0.1 6379 2\n",
        );
        assert_eq!(topo.len(), 2);
    }

    #[test]
    fn quoted_auth_token_is_unwrapped() {
        let topo = parse_str(
            "sentinel monitor q 10.0.0.1 6379 2\n\
             sentinel auth-pass q \"s3cr#t\"\n",
        );
        assert_eq!(topo.pods.get("q").unwrap().auth_token.as_deref(), Some("s3cr#t"));
    }

    #[test]
    fn directive_errors_are_specific() {
        assert_eq!(
            Directive::parse("loglevel notice"),
            Err(DirectiveError::Unknown("loglevel".into()))
        );
        assert_eq!(
            Directive::parse("port"),
            Err(DirectiveError::Arity {
                directive: "port",
                expected: 1,
                got: 0
            })
        );
        assert!(matches!(
            Directive::parse("sentinel monitor m 1.2.3.4 6379 many"),
            Err(DirectiveError::InvalidNumber { field: "quorum", .. })
        ));
        assert_eq!(Directive::parse("   # indented comment"), Ok(None));
    }

    #[test]
    fn missing_file_is_a_config_file_error() {
        let path = Path::new("/nonexistent/redis-latency-watch/sentinel.conf");
        assert!(matches!(load(path), Err(Error::ConfigFile { .. })));
    }

    #[tokio::test]
    async fn async_load_reads_a_real_file() {
        let path = std::env::temp_dir().join(format!(
            "redis-latency-watch-{}.conf",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "sentinel monitor disk 127.0.0.1 6379 2\n").unwrap();

        let topo = load_async(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(topo.pods.get("disk").is_some());

        assert!(matches!(
            load_async(&path).await,
            Err(Error::ConfigFile { .. })
        ));
    }
}
