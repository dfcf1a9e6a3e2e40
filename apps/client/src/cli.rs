//! Command-line parsing.
//!
//! Flags follow the `fs -put` style: a subcommand, then a single-dash
//! operation, then positional arguments.

use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: rhfs <command> [args]

Commands:
  fs     file operations against the data service
  serve  host an in-memory data service (development)

Run `rhfs fs` for file operation usage.";

pub const FS_USAGE: &str = "\
Usage: rhfs fs <operation> [args]

  -ls [path]                      list a directory (default \".\")
  -put <localFile> [remoteFile]   upload (default remote name: local base name)
  -get <remoteFile> [localFile]   download (default local name: remote base name)
  -rm <path>...                   delete
  -rmr <path>...                  delete recursively";

/// Malformed command line.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("unknown command: {0}\n\n{usage}", usage = USAGE)]
    UnknownCommand(String),

    #[error("unknown fs operation: {0}\n\n{usage}", usage = FS_USAGE)]
    UnknownOperation(String),

    #[error("wrong number of arguments for {op}\n\nUsage: rhfs fs {usage}")]
    WrongArguments { op: &'static str, usage: &'static str },

    #[error("too many arguments for serve\n\n{usage}", usage = USAGE)]
    ServeArguments,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the top-level usage.
    Usage,
    /// Print the `fs` usage.
    FsUsage,
    Serve { addr: Option<String> },
    Fs(FsCommand),
}

#[derive(Debug, PartialEq, Eq)]
pub enum FsCommand {
    Ls { path: String },
    Put { local: PathBuf, remote: Option<String> },
    Get { remote: String, local: Option<PathBuf> },
    Rm { paths: Vec<String>, recursive: bool },
}

/// Parses the arguments after the program name.
pub fn parse(args: &[String]) -> Result<Command, UsageError> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Usage);
    };
    match command.as_str() {
        "fs" => parse_fs(rest),
        "serve" => match rest {
            [] => Ok(Command::Serve { addr: None }),
            [addr] => Ok(Command::Serve {
                addr: Some(addr.clone()),
            }),
            _ => Err(UsageError::ServeArguments),
        },
        "-h" | "--help" | "help" => Ok(Command::Usage),
        other => Err(UsageError::UnknownCommand(other.to_string())),
    }
}

fn parse_fs(args: &[String]) -> Result<Command, UsageError> {
    let Some((op, rest)) = args.split_first() else {
        return Ok(Command::FsUsage);
    };

    let command = match op.as_str() {
        "-ls" => match rest {
            [] => FsCommand::Ls { path: ".".into() },
            [path] => FsCommand::Ls { path: path.clone() },
            _ => return Err(wrong("-ls", "-ls [path]")),
        },
        "-put" => match rest {
            [local] => FsCommand::Put {
                local: PathBuf::from(local),
                remote: None,
            },
            [local, remote] => FsCommand::Put {
                local: PathBuf::from(local),
                remote: Some(remote.clone()),
            },
            _ => return Err(wrong("-put", "-put <localFile> [remoteFile]")),
        },
        "-get" => match rest {
            [remote] => FsCommand::Get {
                remote: remote.clone(),
                local: None,
            },
            [remote, local] => FsCommand::Get {
                remote: remote.clone(),
                local: Some(PathBuf::from(local)),
            },
            _ => return Err(wrong("-get", "-get <remoteFile> [localFile]")),
        },
        "-rm" | "-rmr" => {
            let recursive = op.as_str() == "-rmr";
            if rest.is_empty() {
                return Err(if recursive {
                    wrong("-rmr", "-rmr <path>...")
                } else {
                    wrong("-rm", "-rm <path>...")
                });
            }
            FsCommand::Rm {
                paths: rest.to_vec(),
                recursive,
            }
        }
        other => return Err(UsageError::UnknownOperation(other.to_string())),
    };
    Ok(Command::Fs(command))
}

fn wrong(op: &'static str, usage: &'static str) -> UsageError {
    UsageError::WrongArguments { op, usage }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_prints_usage() {
        assert_eq!(parse(&[]).unwrap(), Command::Usage);
        assert_eq!(parse(&args(&["fs"])).unwrap(), Command::FsUsage);
    }

    #[test]
    fn ls_defaults_to_current_directory() {
        assert_eq!(
            parse(&args(&["fs", "-ls"])).unwrap(),
            Command::Fs(FsCommand::Ls { path: ".".into() })
        );
        assert_eq!(
            parse(&args(&["fs", "-ls", "/data"])).unwrap(),
            Command::Fs(FsCommand::Ls {
                path: "/data".into()
            })
        );
    }

    #[test]
    fn put_and_get_optional_destination() {
        assert_eq!(
            parse(&args(&["fs", "-put", "a.bam"])).unwrap(),
            Command::Fs(FsCommand::Put {
                local: "a.bam".into(),
                remote: None
            })
        );
        assert_eq!(
            parse(&args(&["fs", "-get", "r/a.bam", "b.bam"])).unwrap(),
            Command::Fs(FsCommand::Get {
                remote: "r/a.bam".into(),
                local: Some("b.bam".into())
            })
        );
    }

    #[test]
    fn rm_and_rmr_take_many_paths() {
        assert_eq!(
            parse(&args(&["fs", "-rmr", "a", "b"])).unwrap(),
            Command::Fs(FsCommand::Rm {
                paths: args(&["a", "b"]),
                recursive: true
            })
        );
        assert!(matches!(
            parse(&args(&["fs", "-rm"])),
            Err(UsageError::WrongArguments { op: "-rm", .. })
        ));
    }

    #[test]
    fn malformed_input_is_usage_error() {
        assert_eq!(
            parse(&args(&["copy"])).unwrap_err(),
            UsageError::UnknownCommand("copy".into())
        );
        assert_eq!(
            parse(&args(&["fs", "-cat", "x"])).unwrap_err(),
            UsageError::UnknownOperation("-cat".into())
        );
        assert!(matches!(
            parse(&args(&["fs", "-put"])),
            Err(UsageError::WrongArguments { op: "-put", .. })
        ));
        assert!(matches!(
            parse(&args(&["fs", "-get", "a", "b", "c"])),
            Err(UsageError::WrongArguments { op: "-get", .. })
        ));
    }

    #[test]
    fn serve_takes_optional_address() {
        assert_eq!(
            parse(&args(&["serve"])).unwrap(),
            Command::Serve { addr: None }
        );
        assert_eq!(
            parse(&args(&["serve", "0.0.0.0:9091"])).unwrap(),
            Command::Serve {
                addr: Some("0.0.0.0:9091".into())
            }
        );
    }
}
