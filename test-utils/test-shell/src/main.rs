//! Minimal interactive shell used as the program under test.
//!
//! Prints `cush> ` before each line when stdin is a terminal. Builtins:
//! `cd [dir|-]`, `pwd`, `history`, `echo`, `exit [code]`. Anything else is
//! run as an external program. Every line read, blank or not, is recorded
//! in the history.

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::{Command, ExitCode};

const PROMPT: &str = "cush> ";

enum Flow {
    Continue,
    Exit(u8),
}

#[derive(Default)]
struct Shell {
    history: Vec<String>,
    previous_dir: Option<PathBuf>,
}

impl Shell {
    fn run(&mut self, line: &str) -> Flow {
        self.history.push(line.to_string());

        let words = match tokenize(line) {
            Ok(words) => words,
            Err(e) => {
                eprintln!("cush: {e}");
                return Flow::Continue;
            }
        };
        let Some((name, args)) = words.split_first() else {
            return Flow::Continue;
        };

        match name.as_str() {
            "cd" => self.cd(args.first().map(String::as_str)),
            "pwd" => match env::current_dir() {
                Ok(dir) => println!("{}", dir.display()),
                Err(e) => eprintln!("cush: pwd: {e}"),
            },
            "history" => {
                for (i, entry) in self.history.iter().enumerate() {
                    println!("    {} {entry}", i + 1);
                }
            }
            "echo" => println!("{}", args.join(" ")),
            "exit" => {
                let code = args.first().and_then(|c| c.parse::<i32>().ok()).unwrap_or(0);
                return Flow::Exit((code & 0xff) as u8);
            }
            _ => external(name, args),
        }
        Flow::Continue
    }

    fn cd(&mut self, target: Option<&str>) {
        let target = match target {
            Some("-") => match &self.previous_dir {
                Some(dir) => {
                    println!("{}", dir.display());
                    dir.clone()
                }
                None => {
                    eprintln!("cush: cd: no previous directory");
                    return;
                }
            },
            Some(dir) => PathBuf::from(dir),
            None => match env::var_os("HOME") {
                Some(home) => PathBuf::from(home),
                None => {
                    eprintln!("cush: cd: HOME not set");
                    return;
                }
            },
        };

        let current = env::current_dir().ok();
        match env::set_current_dir(&target) {
            Ok(()) => self.previous_dir = current,
            Err(e) => eprintln!("cush: cd: {}: {e}", target.display()),
        }
    }
}

fn external(name: &str, args: &[String]) {
    let _ = io::stdout().flush();
    match Command::new(name).args(args).status() {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            eprintln!("cush: {name}: command not found");
        }
        Err(e) => eprintln!("cush: {name}: {e}"),
    }
}

/// Split a line into words, honoring single quotes, double quotes and
/// backslash escapes.
fn tokenize(line: &str) -> Result<Vec<String>, &'static str> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err("unterminated single quote"),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err("unterminated double quote"),
                        },
                        Some(c) => current.push(c),
                        None => return Err("unterminated double quote"),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn main() -> ExitCode {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut shell = Shell::default();
    let mut line = String::new();

    loop {
        if interactive {
            print!("{PROMPT}");
            let _ = io::stdout().flush();
        }

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(e) => {
                eprintln!("cush: {e}");
                return ExitCode::FAILURE;
            }
        }

        match shell.run(line.trim_end_matches(['\n', '\r'])) {
            Flow::Continue => {}
            Flow::Exit(code) => return ExitCode::from(code),
        }
        let _ = io::stdout().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_split_on_whitespace() {
        assert_eq!(tokenize("  ls   -l  /tmp ").unwrap(), ["ls", "-l", "/tmp"]);
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            tokenize(r#"echo "Hello World" 'a b'c"#).unwrap(),
            ["echo", "Hello World", "a bc"]
        );
        assert_eq!(tokenize(r#"echo "say \"hi\"""#).unwrap(), ["echo", "say \"hi\""]);
        assert_eq!(tokenize("echo ''").unwrap(), ["echo", ""]);
    }

    #[test]
    fn backslash_escapes_space() {
        assert_eq!(tokenize(r"cd my\ dir").unwrap(), ["cd", "my dir"]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert!(tokenize("echo 'oops").is_err());
        assert!(tokenize("echo \"oops").is_err());
    }

    #[test]
    fn history_records_every_line_read() {
        let mut shell = Shell::default();
        shell.run("echo \"Hello World\"");
        shell.run("");
        shell.run("pwd");
        assert_eq!(shell.history, ["echo \"Hello World\"", "", "pwd"]);
    }

    #[test]
    fn exit_codes_wrap_like_a_shell() {
        let mut shell = Shell::default();
        assert!(matches!(shell.run("exit 3"), Flow::Exit(3)));
        assert!(matches!(shell.run("exit 256"), Flow::Exit(0)));
        assert!(matches!(shell.run("exit"), Flow::Exit(0)));
    }
}
