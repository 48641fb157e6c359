//! LLDB command builders.
//!
//! Pure string construction; nothing here talks to a process.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static BREAKPOINT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Breakpoint (\d+)").expect("valid breakpoint id regex"));

/// Double-quote an argument for the LLDB command line.
pub fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Resolve `path` against a session's working directory. `~/` expands to the
/// home directory; absolute paths are returned unchanged.
pub fn resolve_path(working_dir: &Path, path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        working_dir.join(candidate)
    }
}

pub fn load_file(path: &Path) -> String {
    format!("file {}", quote(&path.display().to_string()))
}

/// `None` when there are no arguments to set.
pub fn run_args(args: &[String]) -> Option<String> {
    if args.is_empty() {
        return None;
    }
    let quoted: Vec<String> = args.iter().map(|a| quote(a)).collect();
    Some(format!("settings set -- target.run-args {}", quoted.join(" ")))
}

pub fn target_core(path: &Path) -> String {
    format!("target core {}", quote(&path.display().to_string()))
}

/// `file:line` becomes a file/line breakpoint, anything else a name breakpoint.
pub fn breakpoint_set(location: &str) -> String {
    if let Some((file, line)) = location.rsplit_once(':') {
        if !file.is_empty() && line.trim().parse::<u32>().is_ok() {
            let file = if file.contains(char::is_whitespace) {
                quote(file)
            } else {
                file.to_string()
            };
            return format!("breakpoint set -f {} -l {}", file, line.trim());
        }
    }
    format!("breakpoint set --name {}", location)
}

/// Breakpoint number reported by `breakpoint set`.
pub fn breakpoint_id(output: &str) -> Option<u32> {
    BREAKPOINT_ID
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn breakpoint_condition(id: u32, condition: &str) -> String {
    format!("breakpoint modify -c {} {}", quote(condition), id)
}

pub fn step(instructions: bool) -> &'static str {
    if instructions {
        "stepi"
    } else {
        "step"
    }
}

pub fn next(instructions: bool) -> &'static str {
    if instructions {
        "nexti"
    } else {
        "next"
    }
}

/// `full` covers every thread.
pub fn backtrace(full: bool, limit: Option<u32>) -> String {
    let mut command = String::from("thread backtrace");
    if full {
        command.push_str(" all");
    }
    if let Some(limit) = limit {
        command.push_str(&format!(" -c {}", limit));
    }
    command
}

pub fn print(expression: &str) -> String {
    format!("print {}", expression)
}

/// LLDB `memory read` settings derived from a GDB-style format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFormat {
    /// Unit size in bytes.
    pub size: u8,
    /// LLDB format name.
    pub format: &'static str,
}

impl MemoryFormat {
    /// Parse `[size letter][format letter]`, e.g. `x`, `wx`, `gd`.
    ///
    /// Size letters are b/h/w/g (1/2/4/8 bytes, default 1). Unknown format
    /// letters fall back to hex.
    pub fn parse(spec: &str) -> Self {
        let mut chars = spec.trim().chars();
        let first = chars.next();

        let (size_char, format_char) = match first {
            Some(c @ ('b' | 'h' | 'w' | 'g')) => (c, chars.next().unwrap_or('x')),
            Some(c) => ('b', c),
            None => ('b', 'x'),
        };

        let size = match size_char {
            'h' => 2,
            'w' => 4,
            'g' => 8,
            _ => 1,
        };

        let format = match format_char {
            'd' => "decimal",
            'u' => "unsigned",
            'o' => "octal",
            't' => "binary",
            'f' => "float",
            'c' => "char",
            'i' => "instruction",
            's' => "string",
            _ => "hex",
        };

        Self { size, format }
    }
}

pub fn examine(expression: &str, format: &str, count: u32) -> String {
    let mf = MemoryFormat::parse(format);
    format!(
        "memory read -s{} -f{} -c{} {}",
        mf.size, mf.format, count, expression
    )
}

pub fn registers(register: Option<&str>) -> String {
    match register.map(str::trim).filter(|r| !r.is_empty()) {
        Some(r) => format!("register read {}", r),
        None => "register read".to_string(),
    }
}

pub fn attach(pid: u32) -> String {
    format!("process attach -p {}", pid)
}

/// Commands run by the frame tool, in order.
pub fn frame_info(index: u32) -> [String; 3] {
    [
        format!("frame select {}", index),
        "frame variable".to_string(),
        "source list".to_string(),
    ]
}

/// Hex addresses disassemble from that address, anything else by name.
pub fn disassemble(target: &str) -> String {
    let target = target.trim();
    let is_address = target
        .strip_prefix("0x")
        .or_else(|| target.strip_prefix("0X"))
        .is_some_and(|hex| !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()));
    if is_address {
        format!("disassemble --start-address {}", target)
    } else {
        format!("disassemble --name {}", target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a.out"), "\"a.out\"");
        assert_eq!(quote("my \"prog\""), "\"my \\\"prog\\\"\"");
        assert_eq!(quote(r"C:\x"), "\"C:\\\\x\"");
    }

    #[test]
    fn test_resolve_path() {
        let cwd = Path::new("/work");
        assert_eq!(resolve_path(cwd, "a.out"), PathBuf::from("/work/a.out"));
        assert_eq!(resolve_path(cwd, "bin/a.out"), PathBuf::from("/work/bin/a.out"));
        assert_eq!(resolve_path(cwd, "/usr/bin/true"), PathBuf::from("/usr/bin/true"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_path(cwd, "~/a.out"), home.join("a.out"));
        }
    }

    #[test]
    fn test_load_and_args() {
        assert_eq!(load_file(Path::new("/w/a b")), "file \"/w/a b\"");
        assert_eq!(run_args(&[]), None);
        assert_eq!(
            run_args(&["-v".to_string(), "x y".to_string()]).unwrap(),
            "settings set -- target.run-args \"-v\" \"x y\""
        );
        assert_eq!(target_core(Path::new("/w/core")), "target core \"/w/core\"");
    }

    #[test]
    fn test_breakpoint_location_parsing() {
        assert_eq!(breakpoint_set("main"), "breakpoint set --name main");
        assert_eq!(breakpoint_set("main.c:42"), "breakpoint set -f main.c -l 42");
        assert_eq!(
            breakpoint_set("my file.c:7"),
            "breakpoint set -f \"my file.c\" -l 7"
        );
        assert_eq!(
            breakpoint_set("C:/src/main.c:10"),
            "breakpoint set -f C:/src/main.c -l 10"
        );
        // C++ scope qualifiers are names, not file:line.
        assert_eq!(
            breakpoint_set("ns::Foo::bar"),
            "breakpoint set --name ns::Foo::bar"
        );
    }

    #[test]
    fn test_breakpoint_id_extraction() {
        let out = "Breakpoint 3: where = a.out`main + 4 at main.c:3, address = 0x0000000100003f64";
        assert_eq!(breakpoint_id(out), Some(3));
        assert_eq!(breakpoint_id("error: no such function"), None);
        assert_eq!(
            breakpoint_condition(3, "i == 5"),
            "breakpoint modify -c \"i == 5\" 3"
        );
    }

    #[test]
    fn test_step_commands() {
        assert_eq!(step(false), "step");
        assert_eq!(step(true), "stepi");
        assert_eq!(next(false), "next");
        assert_eq!(next(true), "nexti");
    }

    #[test]
    fn test_backtrace() {
        assert_eq!(backtrace(false, None), "thread backtrace");
        assert_eq!(backtrace(true, None), "thread backtrace all");
        assert_eq!(backtrace(false, Some(5)), "thread backtrace -c 5");
        assert_eq!(backtrace(true, Some(2)), "thread backtrace all -c 2");
    }

    #[test]
    fn test_memory_format_mapping() {
        assert_eq!(MemoryFormat::parse("x"), MemoryFormat { size: 1, format: "hex" });
        assert_eq!(MemoryFormat::parse("wx"), MemoryFormat { size: 4, format: "hex" });
        assert_eq!(MemoryFormat::parse("gd"), MemoryFormat { size: 8, format: "decimal" });
        assert_eq!(MemoryFormat::parse("h"), MemoryFormat { size: 2, format: "hex" });
        assert_eq!(MemoryFormat::parse("s"), MemoryFormat { size: 1, format: "string" });
        assert_eq!(MemoryFormat::parse("z"), MemoryFormat { size: 1, format: "hex" });
        assert_eq!(MemoryFormat::parse(""), MemoryFormat { size: 1, format: "hex" });
        assert_eq!(examine("&x", "wd", 4), "memory read -s4 -fdecimal -c4 &x");
    }

    #[test]
    fn test_misc_commands() {
        assert_eq!(print("argc"), "print argc");
        assert_eq!(registers(None), "register read");
        assert_eq!(registers(Some(" ")), "register read");
        assert_eq!(registers(Some("rip")), "register read rip");
        assert_eq!(attach(42), "process attach -p 42");
        assert_eq!(frame_info(1)[0], "frame select 1");
        assert_eq!(disassemble("main"), "disassemble --name main");
        assert_eq!(disassemble("0x1000"), "disassemble --start-address 0x1000");
        assert_eq!(disassemble("0xzz"), "disassemble --name 0xzz");
    }
}
