//! Dynamic `import()` interop rewrite.
//!
//! A script that does `import("./x.ts")` gets back a namespace object whose
//! only key is `default` when the target was compiled to commonjs. The
//! rewrite appends a `.then` that unwraps such namespaces, so callers see
//! the module's real exports either way.

use super::TransformOutput;

/// Appended after every dynamic `import(...)` call.
pub const ESM_INTEROP_SUFFIX: &str = ".then((mod)=>{const exports=Object.keys(mod);\
if(exports.length===1&&exports[0]==='default'&&mod.default&&mod.default.__esModule)\
{return mod.default}return mod})";

/// Rewrite every dynamic `import(...)` in `source`.
///
/// Returns `None` when the source has no dynamic import, so callers can
/// hand the original text through untouched. Text inside strings, templates,
/// comments and regex literals is skipped, while code inside template `${ }`
/// expressions is scanned. `import.meta` and static imports are left alone.
/// The accompanying source map is the identity mapping, line for line.
#[must_use]
pub fn rewrite_dynamic_imports(source: &str) -> Option<TransformOutput> {
    if !source.contains("import") {
        return None;
    }

    let chars: Vec<char> = source.chars().collect();
    let insertions = find_call_ends(&chars);
    if insertions.is_empty() {
        return None;
    }

    let mut code = String::with_capacity(source.len() + insertions.len() * ESM_INTEROP_SUFFIX.len());
    let mut next = insertions.iter().peekable();
    for (i, &c) in chars.iter().enumerate() {
        code.push(c);
        if next.peek().is_some_and(|&&at| at == i) {
            code.push_str(ESM_INTEROP_SUFFIX);
            next.next();
        }
    }

    Some(TransformOutput::new(code).with_map(identity_map(source)))
}

/// Keywords after which a `/` starts a regular expression, not a division.
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "await", "case", "delete", "do", "else", "in", "instanceof", "new", "of", "return", "throw",
    "typeof", "void", "yield",
];

/// Indices of the closing `)` of each dynamic import call, ascending.
fn find_call_ends(chars: &[char]) -> Vec<usize> {
    Scanner::new(chars).run()
}

/// Token-level walk over the source.
///
/// Tracks enough lexical state to tell code from text: string and template
/// literals (with their `${ }` expressions), comments, regex literals, and
/// which open parenthesis belongs to an `import` call.
struct Scanner<'a> {
    chars: &'a [char],
    pos: usize,
    /// A `/` here would start a regex literal.
    regex_allowed: bool,
    /// The last token was the `import` keyword.
    pending_import: bool,
    after_dot: bool,
    /// One entry per open `(`: whether it opens an import call.
    parens: Vec<bool>,
    /// Open `{` count inside each template `${` being scanned.
    templates: Vec<usize>,
    ends: Vec<usize>,
}

impl<'a> Scanner<'a> {
    fn new(chars: &'a [char]) -> Self {
        Self {
            chars,
            pos: 0,
            regex_allowed: true,
            pending_import: false,
            after_dot: false,
            parens: Vec::new(),
            templates: Vec::new(),
            ends: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<usize> {
        while let Some(c) = self.peek(0) {
            match c {
                c if c.is_whitespace() => self.pos += 1,
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => self.skip_block_comment(),
                '/' if self.regex_allowed => {
                    self.skip_regex();
                    self.token(false);
                }
                '"' | '\'' => {
                    self.skip_string(c);
                    self.token(false);
                }
                '`' => {
                    self.pos += 1;
                    self.scan_template_text();
                }
                '{' => {
                    if let Some(depth) = self.templates.last_mut() {
                        *depth += 1;
                    }
                    self.pos += 1;
                    self.token(true);
                }
                '}' => {
                    self.pos += 1;
                    match self.templates.last_mut() {
                        Some(0) => {
                            self.templates.pop();
                            self.scan_template_text();
                        }
                        Some(depth) => {
                            *depth -= 1;
                            self.token(true);
                        }
                        None => self.token(true),
                    }
                }
                '(' => {
                    self.parens.push(self.pending_import);
                    self.pos += 1;
                    self.token(true);
                }
                ')' => {
                    if self.parens.pop() == Some(true) {
                        self.ends.push(self.pos);
                    }
                    self.pos += 1;
                    self.token(false);
                }
                ']' => {
                    self.pos += 1;
                    self.token(false);
                }
                c if is_ident_start(c) => self.word(),
                c if c.is_ascii_digit() => {
                    while self
                        .peek(0)
                        .is_some_and(|c| c.is_alphanumeric() || c == '.' || c == '_')
                    {
                        self.pos += 1;
                    }
                    self.token(false);
                }
                c => {
                    self.pos += 1;
                    self.token(true);
                    self.after_dot = c == '.';
                }
            }
        }

        // Inner calls close first
        self.ends.sort_unstable();
        self.ends
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn token(&mut self, regex_allowed: bool) {
        self.regex_allowed = regex_allowed;
        self.pending_import = false;
        self.after_dot = false;
    }

    fn word(&mut self) {
        let start = self.pos;
        while self.peek(0).is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        // `obj.import(...)` is a method call
        let is_import = word == "import" && !self.after_dot;
        self.token(REGEX_PRECEDING_KEYWORDS.contains(&word.as_str()));
        self.pending_import = is_import;
    }

    fn skip_line_comment(&mut self) {
        while self.peek(0).is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.chars.len() && !(self.peek(0) == Some('*') && self.peek(1) == Some('/')) {
            self.pos += 1;
        }
        self.pos = (self.pos + 2).min(self.chars.len());
    }

    fn skip_string(&mut self, quote: char) {
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            match c {
                '\\' => self.pos += 2,
                '\n' => break,
                c if c == quote => {
                    self.pos += 1;
                    break;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.chars.len());
    }

    fn skip_regex(&mut self) {
        self.pos += 1;
        let mut in_class = false;
        while let Some(c) = self.peek(0) {
            match c {
                '\\' => self.pos += 2,
                '\n' => break,
                '[' => {
                    in_class = true;
                    self.pos += 1;
                }
                ']' => {
                    in_class = false;
                    self.pos += 1;
                }
                '/' if !in_class => {
                    self.pos += 1;
                    break;
                }
                _ => self.pos += 1,
            }
        }
        while self.peek(0).is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        self.pos = self.pos.min(self.chars.len());
    }

    /// Scan template text up to the closing backtick or the next `${`.
    fn scan_template_text(&mut self) {
        while let Some(c) = self.peek(0) {
            match c {
                '\\' => self.pos += 2,
                '`' => {
                    self.pos += 1;
                    self.token(false);
                    return;
                }
                '$' if self.peek(1) == Some('{') => {
                    self.pos += 2;
                    self.templates.push(0);
                    self.token(true);
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.chars.len());
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Version 3 source map mapping each generated line to the same source line.
fn identity_map(source: &str) -> String {
    let lines = source.split('\n').count();
    let mut mappings = String::from("AAAA");
    for _ in 1..lines {
        mappings.push_str(";AACA");
    }
    serde_json::json!({
        "version": 3,
        "sources": [""],
        "names": [],
        "mappings": mappings,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(source: &str) -> Option<String> {
        rewrite_dynamic_imports(source).map(|out| out.code)
    }

    #[test]
    fn test_no_dynamic_import() {
        assert_eq!(rewrite("const a = require('a');"), None);
        assert_eq!(rewrite("import a from './a.js';\nexport { a };"), None);
        assert_eq!(rewrite("console.log(import.meta.url);"), None);
    }

    #[test]
    fn test_appends_interop() {
        let out = rewrite("const m = await import('./m.ts');").unwrap();
        assert_eq!(out, format!("const m = await import('./m.ts'){ESM_INTEROP_SUFFIX};"));
    }

    #[test]
    fn test_multiple_and_nested_parens() {
        let out = rewrite("import(path.join(a, 'b'));\nimport ( x );").unwrap();
        assert_eq!(
            out,
            format!("import(path.join(a, 'b')){ESM_INTEROP_SUFFIX};\nimport ( x ){ESM_INTEROP_SUFFIX};")
        );
    }

    #[test]
    fn test_ignores_strings_and_comments() {
        assert_eq!(rewrite("const s = \"import('x')\";"), None);
        assert_eq!(rewrite("// import('x')\n/* import('y') */"), None);
        assert_eq!(rewrite("const t = `import('${x}')`;"), None);
        assert_eq!(rewrite("loader.import('x');"), None);

        let out = rewrite("import(')' /* ) */);").unwrap();
        assert_eq!(out, format!("import(')' /* ) */){ESM_INTEROP_SUFFIX};"));
    }

    #[test]
    fn test_template_expressions_are_code() {
        let out = rewrite("const t = `${await import('./x.js')}`;").unwrap();
        assert_eq!(out, format!("const t = `${{await import('./x.js'){ESM_INTEROP_SUFFIX}}}`;"));

        let out = rewrite("const t = `a ${ { k: `${x}` }.k } b`; import('./y.js');").unwrap();
        assert!(out.ends_with(&format!("import('./y.js'){ESM_INTEROP_SUFFIX};")));
    }

    #[test]
    fn test_regex_literals_are_skipped() {
        let out = rewrite("const r = /'/;\nconst m = import('./m.js');\n").unwrap();
        assert_eq!(out, format!("const r = /'/;\nconst m = import('./m.js'){ESM_INTEROP_SUFFIX};\n"));

        let out = rewrite("if (s.match(/[/\"]import\\(/g)) { import('./a.js'); }").unwrap();
        assert_eq!(out.matches(ESM_INTEROP_SUFFIX).count(), 1);
        assert!(out.contains(&format!("import('./a.js'){ESM_INTEROP_SUFFIX};")));

        assert_eq!(rewrite("return /import('x')/.test(s);"), None);
    }

    #[test]
    fn test_division_is_not_regex() {
        let out = rewrite("const half = total / 2; const q = '/'; import('./z.js');").unwrap();
        assert!(out.ends_with(&format!("import('./z.js'){ESM_INTEROP_SUFFIX};")));
    }

    #[test]
    fn test_nested_import_calls() {
        let out = rewrite("import(await import('./name.js'));").unwrap();
        assert_eq!(
            out,
            format!("import(await import('./name.js'){ESM_INTEROP_SUFFIX}){ESM_INTEROP_SUFFIX};")
        );
    }

    #[test]
    fn test_identity_map() {
        let out = rewrite_dynamic_imports("a\nimport('b')\nc").unwrap();
        let map: serde_json::Value = serde_json::from_str(out.map.as_deref().unwrap()).unwrap();
        assert_eq!(map["mappings"], "AAAA;AACA;AACA");
    }
}
