//! Rego module parser.
//!
//! Source is syntax-checked with `regorus`, then scanned line by line for the
//! parts metadata extraction needs: package, imports, comments and top-level
//! rules. Policy logic is never evaluated.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CompilerError, Result};

/// A comment line and its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Line number in the source.
    pub line: usize,
    /// Text after the `#`, untrimmed.
    pub text: String,
}

/// A top-level rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Rule head name (`violation`, `warn`, `policyID`, ...).
    pub name: String,
    /// Line of the rule head.
    pub line: usize,
    /// Head and body text, without comments.
    pub text: String,
}

impl Rule {
    /// Returns the value assigned in the rule head, if any.
    ///
    /// `policyID := "P1001"` yields `P1001`.
    #[must_use]
    pub fn head_value(&self) -> Option<String> {
        let (head, _) = split_comment(self.text.lines().next()?, &mut false);
        let idx = head.find(":=").map(|i| i + 2).or_else(|| head.find('=').map(|i| i + 1))?;
        let value = head[idx..].split(" if").next()?.trim();
        let value = value.trim_matches('"').trim_matches('`');
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// A parsed Rego module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegoModule {
    /// Source file path.
    pub path: PathBuf,
    /// Declared package, without the `data.` prefix.
    pub package: String,
    /// Line of the package declaration.
    pub package_line: usize,
    /// Import paths in declaration order, aliases stripped.
    pub imports: Vec<String>,
    /// Every full-line comment.
    pub comments: Vec<Comment>,
    /// Top-level rules in declaration order.
    pub rules: Vec<Rule>,
    /// Raw source.
    pub source: String,
}

impl RegoModule {
    /// Returns the `data.`-qualified package path used for import lookup.
    #[must_use]
    pub fn package_path(&self) -> String {
        format!("data.{}", self.package)
    }

    /// Returns the comments placed before the package declaration.
    #[must_use]
    pub fn header_comments(&self) -> Vec<Comment> {
        self.comments
            .iter()
            .filter(|c| c.line < self.package_line)
            .cloned()
            .collect()
    }

    /// Returns the comments after the package declaration.
    pub fn body_comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter().filter(|c| c.line > self.package_line)
    }

    /// Returns rule head names in declaration order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name.clone()).collect()
    }

    /// Returns the first rule with the given name.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Returns the display form of the source path.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Parser for Rego module files.
///
/// # Examples
///
/// ```rust
/// use kanon_compiler::Parser;
///
/// let module = Parser::new()
///     .parse_source(
///         "# @title Example\npackage example\n\nimport rego.v1\n\nviolation contains msg if {\n    msg := \"no\"\n}\n",
///         "policies/example/src.rego",
///     )
///     .unwrap();
///
/// assert_eq!(module.package, "example");
/// assert_eq!(module.rule_names(), vec!["violation"]);
/// ```
#[derive(Debug)]
pub struct Parser {
    /// Whether to run the full Rego parser before scanning.
    syntax_check: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a new parser with syntax checking enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self { syntax_check: true }
    }

    /// Sets whether to syntax-check sources with the Rego parser.
    #[must_use]
    pub const fn with_syntax_check(mut self, check: bool) -> Self {
        self.syntax_check = check;
        self
    }

    /// Parses a Rego module from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<RegoModule> {
        let path = path.as_ref();
        debug!(?path, "Parsing rego file");

        let source = fs::read_to_string(path).map_err(|e| CompilerError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.parse_source(&source, path)
    }

    /// Parses a Rego module from source code.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not valid Rego or has no package.
    pub fn parse_source(&self, source: &str, path: impl AsRef<Path>) -> Result<RegoModule> {
        let path = path.as_ref();
        let file_name = path.display().to_string();

        if self.syntax_check {
            check_syntax(source, &file_name)?;
        }

        let mut module = RegoModule {
            path: path.to_path_buf(),
            package: String::new(),
            package_line: 0,
            imports: Vec::new(),
            comments: Vec::new(),
            rules: Vec::new(),
            source: source.to_string(),
        };
        let mut current: Option<Rule> = None;
        let mut in_raw = false;

        for (idx, line) in source.lines().enumerate() {
            let line_num = idx + 1;
            let continues_raw = in_raw;
            let (code, comment) = split_comment(line, &mut in_raw);
            let trimmed = code.trim();
            let text = if comment.is_some() { code.trim_end() } else { line };

            if continues_raw {
                if let Some(rule) = current.as_mut() {
                    rule.text.push_str(text);
                    rule.text.push('\n');
                }
                continue;
            }

            if trimmed.is_empty() {
                if let Some(comment) = comment {
                    module.comments.push(Comment {
                        line: line_num,
                        text: comment.to_string(),
                    });
                } else if let Some(rule) = current.as_mut() {
                    rule.text.push('\n');
                }
                continue;
            }

            if module.package_line == 0 {
                let Some(rest) = strip_keyword(trimmed, "package") else {
                    return Err(CompilerError::MissingPackage { file: file_name });
                };
                let package = rest.trim().trim_end_matches(';');
                if package.is_empty() {
                    return Err(CompilerError::ParseError {
                        file: file_name,
                        line: line_num,
                        message: "Empty package name".to_string(),
                    });
                }
                module.package = package.to_string();
                module.package_line = line_num;
                continue;
            }

            if let Some(rest) = strip_keyword(trimmed, "import") {
                module.rules.extend(current.take());
                if let Some(path) = rest.split_whitespace().next() {
                    module.imports.push(path.trim_end_matches(';').to_string());
                }
                continue;
            }

            let top_level = !line.starts_with(char::is_whitespace);
            if top_level {
                if let Some(name) = rule_head_name(trimmed) {
                    module.rules.extend(current.take());
                    current = Some(Rule {
                        name,
                        line: line_num,
                        text: format!("{text}\n"),
                    });
                    continue;
                }
            }

            if let Some(rule) = current.as_mut() {
                rule.text.push_str(text);
                rule.text.push('\n');
            }
        }
        module.rules.extend(current);

        if module.package_line == 0 {
            return Err(CompilerError::MissingPackage { file: file_name });
        }

        for rule in &mut module.rules {
            let trimmed = rule.text.trim_end().len();
            rule.text.truncate(trimmed);
        }

        debug!(
            package = %module.package,
            rules = module.rules.len(),
            imports = module.imports.len(),
            "Parsed rego module"
        );

        Ok(module)
    }
}

/// Runs the source through the `regorus` parser.
fn check_syntax(source: &str, file_name: &str) -> Result<()> {
    let mut engine = regorus::Engine::new();
    engine
        .add_policy(file_name.to_string(), source.to_string())
        .map_err(|e| {
            let message = e.to_string();
            CompilerError::ParseError {
                file: file_name.to_string(),
                line: extract_line_from_error(&message).unwrap_or(1),
                message,
            }
        })?;
    Ok(())
}

/// Returns the source without full-line comments.
///
/// Lines inside a raw string are kept even when they start with `#`.
///
/// ```rust
/// use kanon_compiler::parser::strip_comment_lines;
///
/// let source = "# header\npackage a\n\nx := `\n# kept\n`\n";
/// assert_eq!(strip_comment_lines(source), "package a\n\nx := `\n# kept\n`");
/// ```
#[must_use]
pub fn strip_comment_lines(source: &str) -> String {
    let mut in_raw = false;
    source
        .lines()
        .filter(|line| {
            let continues_raw = in_raw;
            let (code, comment) = split_comment(line, &mut in_raw);
            continues_raw || comment.is_none() || !code.trim().is_empty()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits a line into code and the text of a trailing comment.
///
/// `#` only starts a comment outside string literals. `in_raw` carries an
/// unterminated backtick string over to the next line.
fn split_comment<'a>(line: &'a str, in_raw: &mut bool) -> (&'a str, Option<&'a str>) {
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in line.char_indices() {
        if *in_raw {
            if c == '`' {
                *in_raw = false;
            }
        } else if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '`' => *in_raw = true,
                '#' => return (&line[..idx], Some(&line[idx + 1..])),
                _ => {}
            }
        }
    }

    (line, None)
}

/// Strips a leading keyword followed by whitespace.
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    line.strip_prefix(keyword)
        .filter(|rest| rest.starts_with(char::is_whitespace))
}

/// Extracts the rule name from a top-level line, if it is a rule head.
///
/// Recognized heads: `name[..]`, `name { .. }`, `name := ..`, `name = ..`,
/// `name if ..`, `name contains ..`, `name(..)`, `name.ref ..` and the
/// `default` forms of these.
fn rule_head_name(line: &str) -> Option<String> {
    if line.starts_with('}') || strip_keyword(line, "else").is_some() || line == "else" {
        return None;
    }

    let line = strip_keyword(line, "default").map_or(line, str::trim_start);

    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(line.len());
    let name = &line[..end];
    if !is_valid_identifier(name) {
        return None;
    }

    let rest = line[end..].trim_start();
    let is_head = rest.is_empty()
        || rest.starts_with(['[', '{', '(', '.'])
        || rest.starts_with(":=")
        || (rest.starts_with('=') && !rest.starts_with("=="))
        || is_word(rest, "if")
        || is_word(rest, "contains");

    is_head.then(|| name.to_string())
}

/// Checks that `rest` starts with `word` as a whole word.
fn is_word(rest: &str, word: &str) -> bool {
    rest.strip_prefix(word)
        .is_some_and(|after| after.is_empty() || after.starts_with([' ', '\t', '{']))
}

/// Checks if a string is a valid Rego identifier.
fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Extracts line number from error message.
fn extract_line_from_error(msg: &str) -> Option<usize> {
    let msg_lower = msg.to_lowercase();

    // Pattern: "line N"
    if let Some(idx) = msg_lower.find("line ") {
        let rest = &msg[idx + 5..];
        if let Some(num_str) = rest.split_whitespace().next() {
            if let Ok(num) = num_str.trim_matches(|c: char| !c.is_ascii_digit()).parse() {
                return Some(num);
            }
        }
    }

    // Pattern: "file.rego:N:M"
    for part in msg.split(':') {
        if let Ok(num) = part.trim().parse() {
            if num > 0 {
                return Some(num);
            }
        }
    }

    None
}
