// Conventional-commit message synthesis from a staged diff.
//
// Deterministic and stateless: `(changed files, diff text) -> message`.
// Classification is driven by ordered tables so rules can be added without
// touching the resolution code:
//   TYPE_RULES     first matching predicate picks the commit type
//   DIR_SCOPES     directory name -> scope
//   SUMMARY_RULES  first matching (type, scope) predicate renders the summary
//   BULLET_RULES   every signal contributes body sentences, deduplicated

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::sync::OnceLock;

use autopilot_common::diff::UnifiedDiff;
use autopilot_common::types::ChangedFile;
use regex::Regex;

/// Message used in `simple` mode.
pub const SIMPLE_MESSAGE: &str = "chore: auto-commit changes";
/// Message used when there is nothing to describe.
pub const EMPTY_MESSAGE: &str = "chore: update changes";

const MAX_HEADER_CHARS: usize = 72;
const MAX_LISTED_FILES: usize = 3;
const MAX_BULLETS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitType {
    Feat,
    Fix,
    Docs,
    Style,
    Refactor,
    Test,
    Ci,
    Chore,
}

impl CommitType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feat => "feat",
            Self::Fix => "fix",
            Self::Docs => "docs",
            Self::Style => "style",
            Self::Refactor => "refactor",
            Self::Test => "test",
            Self::Ci => "ci",
            Self::Chore => "chore",
        }
    }
}

/// A synthesized message before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub commit_type: CommitType,
    pub scope: Option<String>,
    pub summary: String,
    pub bullets: Vec<String>,
    /// Text for the `BREAKING CHANGE:` footer.
    pub breaking: Option<String>,
    /// Name of the type rule that fired.
    pub rule: &'static str,
}

impl CommitMessage {
    pub fn header(&self) -> String {
        let scope = self.scope.as_deref().map(|scope| format!("({scope})")).unwrap_or_default();
        let bang = if self.breaking.is_some() { "!" } else { "" };
        let header = format!("{}{scope}{bang}: {}", self.commit_type.as_str(), self.summary);
        truncate_header(&header, MAX_HEADER_CHARS)
    }
}

impl Display for CommitMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())?;
        if !self.bullets.is_empty() {
            write!(f, "\n\n")?;
            for (index, bullet) in self.bullets.iter().enumerate() {
                if index > 0 {
                    writeln!(f)?;
                }
                write!(f, "- {bullet}")?;
            }
        }
        if let Some(breaking) = &self.breaking {
            write!(f, "\n\nBREAKING CHANGE: {breaking}")?;
        }
        Ok(())
    }
}

/// Render a commit message for `files` and the staged `diff_text`.
pub fn synthesize(files: &[ChangedFile], diff_text: &str) -> String {
    match classify(files, diff_text) {
        Some(message) => message.to_string(),
        None => EMPTY_MESSAGE.to_string(),
    }
}

/// Classify a change set. Returns `None` when there are no files.
pub fn classify(files: &[ChangedFile], diff_text: &str) -> Option<CommitMessage> {
    if files.is_empty() {
        return None;
    }

    let analysis = Analysis::new(files, diff_text);
    let type_rule = TYPE_RULES
        .iter()
        .find(|rule| (rule.applies)(&analysis))
        .unwrap_or(&FALLBACK_TYPE_RULE);
    let commit_type = type_rule.commit_type;
    let scope = resolve_scope(&analysis, commit_type);

    let draft = Draft { commit_type, scope };
    let summary = SUMMARY_RULES
        .iter()
        .find(|rule| (rule.applies)(&analysis, &draft))
        .map(|rule| (rule.render)(&analysis, &draft))
        .unwrap_or_else(|| format!("update {}", subject(&analysis, &draft)));

    Some(CommitMessage {
        commit_type,
        breaking: detect_breaking(&analysis, commit_type),
        bullets: collect_bullets(&analysis),
        scope: draft.scope,
        summary,
        rule: type_rule.name,
    })
}

// ── Analysis ───────────────────────────────────────────────────────

struct Analysis<'a> {
    files: &'a [ChangedFile],
    diff: UnifiedDiff,
    signals: Signals,
}

#[derive(Debug, Default)]
struct Signals {
    ui_markup: bool,
    style_tokens: bool,
    /// Every changed line is markup/style related.
    style_only: bool,
    config_keys: BTreeSet<String>,
    new_components: BTreeSet<String>,
    structural_deletions: bool,
    version_bump: Option<String>,
    dependency_change: bool,
}

impl<'a> Analysis<'a> {
    fn new(files: &'a [ChangedFile], diff_text: &str) -> Self {
        let diff = UnifiedDiff::parse(diff_text);
        let signals = Signals::collect(files, &diff);
        Self { files, diff, signals }
    }

    fn all(&self, predicate: fn(&str) -> bool) -> bool {
        !self.files.is_empty() && self.files.iter().all(|file| predicate(&file.path))
    }

    fn any(&self, predicate: fn(&str) -> bool) -> bool {
        self.files.iter().any(|file| predicate(&file.path))
    }

    fn is_new(&self, file: &ChangedFile) -> bool {
        file.status.is_new() || self.diff.file(&file.path).is_some_and(|diff| diff.is_new)
    }

    fn is_deleted(&self, file: &ChangedFile) -> bool {
        file.status.is_deleted() || self.diff.file(&file.path).is_some_and(|diff| diff.is_deleted)
    }

    fn new_source_files(&self) -> impl Iterator<Item = &ChangedFile> {
        self.files.iter().filter(|file| is_code_path(&file.path) && self.is_new(file))
    }
}

impl Signals {
    fn collect(files: &[ChangedFile], diff: &UnifiedDiff) -> Self {
        let mut signals = Self::default();
        let mut changed_lines = 0usize;
        let mut style_lines = 0usize;

        for file in &diff.files {
            let path = file.path.as_str();
            let packaging = is_packaging_path(path);
            let config_like = is_config_path(path) && !packaging;

            for line in file.additions.iter().chain(file.deletions.iter()) {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                changed_lines += 1;
                if is_style_line(path, trimmed) {
                    style_lines += 1;
                }
                if UI_MARKUP_MARKERS.iter().any(|marker| trimmed.contains(marker)) {
                    signals.ui_markup = true;
                }
                if is_stylesheet_path(path)
                    || STYLE_TOKEN_MARKERS.iter().any(|marker| trimmed.contains(marker))
                {
                    signals.style_tokens = true;
                }
                if config_like {
                    if let Some(key) = config_key(trimmed) {
                        signals.config_keys.insert(key);
                    }
                }
            }

            for line in &file.additions {
                if packaging {
                    match version_value(line) {
                        Some(version) => signals.version_bump = Some(version),
                        None if !line.trim().is_empty() => signals.dependency_change = true,
                        None => {}
                    }
                }
                if is_component_path(path) {
                    if let Some(name) = component_export(line) {
                        signals.new_components.insert(name);
                    }
                }
            }

            if packaging && file.additions.is_empty() && !file.deletions.is_empty() {
                signals.dependency_change = true;
            }

            if is_code_path(path)
                && file.deletions.iter().any(|line| structural_declaration().is_match(line))
            {
                signals.structural_deletions = true;
            }
        }

        // New component files count even when their export is not in the diff.
        for file in files {
            if is_component_path(&file.path) && file.status.is_new() {
                if let Some(stem) = file_stem(&file.path).filter(|stem| starts_uppercase(stem)) {
                    signals.new_components.insert(stem.to_string());
                }
            }
        }

        signals.style_only = changed_lines > 0 && style_lines == changed_lines;
        signals
    }
}

// ── Path classification ────────────────────────────────────────────

const TEST_DIRS: &[&str] = &["test", "tests", "__tests__", "spec", "specs", "e2e"];
const TEST_NAME_MARKERS: &[&str] = &[".test.", ".spec.", "_test.", "_spec."];
const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "markdown", "rst", "adoc"];
const DOC_DIRS: &[&str] = &["docs", "doc", "documentation"];
const DOC_FILES: &[&str] = &["README", "LICENSE", "CHANGELOG", "CONTRIBUTING", "AUTHORS", "NOTICE"];
const CI_PREFIXES: &[&str] = &[".github/workflows/", ".circleci/", ".buildkite/", ".gitlab/ci/"];
const CI_FILES: &[&str] =
    &[".gitlab-ci.yml", ".travis.yml", "Jenkinsfile", "azure-pipelines.yml", "bitbucket-pipelines.yml"];
const PACKAGING_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.toml",
    "Cargo.lock",
    "pyproject.toml",
    "poetry.lock",
    "requirements.txt",
    "setup.py",
    "setup.cfg",
    "go.mod",
    "go.sum",
    "Gemfile",
    "Gemfile.lock",
    "composer.json",
    "composer.lock",
    "pom.xml",
    "build.gradle",
];
const STYLESHEET_EXTENSIONS: &[&str] = &["css", "scss", "sass", "less", "styl", "pcss"];
const CODE_EXTENSIONS: &[&str] = &[
    "rs", "js", "jsx", "ts", "tsx", "mjs", "cjs", "vue", "svelte", "py", "go", "java", "kt", "rb",
    "php", "c", "h", "cc", "cpp", "hpp", "cs", "swift", "scala", "ex", "exs", "sh",
];
const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "ini", "env"];
const COMPONENT_DIRS: &[&str] = &["components", "component", "widgets", "views", "ui"];
const UI_MARKUP_MARKERS: &[&str] = &["className=", "class=\"", "style=", "<div", "<span", "<button"];
const STYLE_TOKEN_MARKERS: &[&str] = &["var(--", "--color", "--theme", "$theme", "theme."];

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
}

fn dir_components(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = components(path).collect();
    parts.pop();
    parts
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty()).then_some(ext)
}

fn file_stem(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => Some(stem),
        _ => (!name.is_empty()).then_some(name),
    }
}

fn has_extension(path: &str, set: &[&str]) -> bool {
    extension(path).is_some_and(|ext| set.iter().any(|candidate| candidate.eq_ignore_ascii_case(ext)))
}

fn is_test_path(path: &str) -> bool {
    let name = file_name(path);
    dir_components(path).iter().any(|dir| TEST_DIRS.contains(dir))
        || TEST_NAME_MARKERS.iter().any(|marker| name.contains(marker))
        || name.starts_with("test_")
}

/// Markup extensions, well-known top-level docs (`LICENSE`, `README.txt`),
/// or anything under a docs directory. Plain `.txt` alone is not enough.
fn is_doc_path(path: &str) -> bool {
    let stem = file_stem(path).unwrap_or_default();
    has_extension(path, DOC_EXTENSIONS) && !is_packaging_path(path)
        || dir_components(path).iter().any(|dir| DOC_DIRS.contains(dir))
        || DOC_FILES.iter().any(|doc| stem.eq_ignore_ascii_case(doc))
}

fn is_ci_path(path: &str) -> bool {
    CI_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) || CI_FILES.contains(&path)
}

fn is_packaging_path(path: &str) -> bool {
    let name = file_name(path);
    PACKAGING_FILES.contains(&name) || name.ends_with(".gemspec")
}

fn is_stylesheet_path(path: &str) -> bool {
    has_extension(path, STYLESHEET_EXTENSIONS)
}

fn is_config_path(path: &str) -> bool {
    has_extension(path, CONFIG_EXTENSIONS) || file_name(path).starts_with(".env")
}

fn is_component_path(path: &str) -> bool {
    dir_components(path).iter().any(|dir| COMPONENT_DIRS.contains(dir))
}

/// Application code: a code file that is not a test.
fn is_code_path(path: &str) -> bool {
    has_extension(path, CODE_EXTENSIONS) && !is_test_path(path)
}

fn is_style_line(path: &str, line: &str) -> bool {
    is_stylesheet_path(path)
        || UI_MARKUP_MARKERS.iter().any(|marker| line.contains(marker))
        || STYLE_TOKEN_MARKERS.iter().any(|marker| line.contains(marker))
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

// ── Line patterns ──────────────────────────────────────────────────

fn structural_declaration() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:fn|function|class|def|struct|enum|trait|impl|interface)\b",
        )
        .expect("structural declaration pattern should compile")
    })
}

fn config_key(line: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r#"^["']?([A-Za-z_][\w.-]*)["']?\s*[:=]"#).expect("config key pattern should compile")
    });
    let key = pattern.captures(line)?.get(1)?.as_str();
    (key.len() < 30).then(|| key.to_string())
}

fn version_value(line: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r#"^\s*"?version"?\s*[:=]\s*"([^"]+)""#).expect("version pattern should compile")
    });
    pattern.captures(line).and_then(|captures| captures.get(1)).map(|m| m.as_str().to_string())
}

fn component_export(line: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^\s*export\s+(?:default\s+)?(?:const|function|class)\s+([A-Z]\w*)")
            .expect("component export pattern should compile")
    });
    pattern.captures(line).and_then(|captures| captures.get(1)).map(|m| m.as_str().to_string())
}

fn breaking_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"BREAKING[ -]CHANGE:?\s*(.*)$").expect("breaking marker pattern should compile")
    })
}

/// Public declarations whose parameter list is part of the API.
fn public_signatures() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(
                    r"^\s*export\s+(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)\s*\((?P<params>[^)]*)\)",
                )
                .expect("exported function pattern should compile"),
                Regex::new(
                    r"^\s*export\s+const\s+(?P<name>[A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?\((?P<params>[^)]*)\)\s*=>",
                )
                .expect("exported arrow pattern should compile"),
                Regex::new(
                    r"^\s*pub\s+(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(?P<name>\w+)\s*(?:<[^>]*>)?\s*\((?P<params>[^)]*)\)",
                )
                .expect("rust pub fn pattern should compile"),
                Regex::new(r"^\s*(?:async\s+)?def\s+(?P<name>[A-Za-z]\w*)\s*\((?P<params>[^)]*)\)")
                    .expect("python def pattern should compile"),
                Regex::new(
                    r"^\s*(?:public\s+)?(?:static\s+)?(?:async\s+)?(?P<name>[a-z]\w*)\s*\((?P<params>[^)]*)\)\s*\{",
                )
                .expect("method pattern should compile"),
            ]
        })
        .as_slice()
}

const NOT_METHOD_NAMES: &[&str] =
    &["if", "for", "while", "switch", "catch", "function", "return", "match", "with"];

fn public_signature(line: &str) -> Option<(String, String)> {
    public_signatures().iter().find_map(|pattern| {
        let captures = pattern.captures(line)?;
        let name = captures.name("name")?.as_str();
        if NOT_METHOD_NAMES.contains(&name) {
            return None;
        }
        let params = captures.name("params")?.as_str();
        Some((name.to_string(), normalize_params(params)))
    })
}

fn normalize_params(params: &str) -> String {
    params.split(',').map(str::trim).filter(|param| !param.is_empty()).collect::<Vec<_>>().join(", ")
}

// ── Type rules ─────────────────────────────────────────────────────

struct TypeRule {
    name: &'static str,
    commit_type: CommitType,
    applies: fn(&Analysis<'_>) -> bool,
}

const TYPE_RULES: &[TypeRule] = &[
    TypeRule { name: "tests-only", commit_type: CommitType::Test, applies: only_tests },
    TypeRule { name: "docs-only", commit_type: CommitType::Docs, applies: only_docs },
    TypeRule { name: "ci-only", commit_type: CommitType::Ci, applies: only_ci },
    TypeRule { name: "packaging-only", commit_type: CommitType::Chore, applies: only_packaging },
    TypeRule { name: "style-only", commit_type: CommitType::Style, applies: only_style },
    TypeRule { name: "new-source-file", commit_type: CommitType::Feat, applies: adds_source_file },
    TypeRule { name: "structural-rework", commit_type: CommitType::Refactor, applies: reworks_structure },
    TypeRule { name: "source-change", commit_type: CommitType::Fix, applies: touches_source },
];

static FALLBACK_TYPE_RULE: TypeRule =
    TypeRule { name: "fallback", commit_type: CommitType::Chore, applies: |_| true };

fn only_tests(analysis: &Analysis<'_>) -> bool {
    analysis.all(is_test_path)
}

fn only_docs(analysis: &Analysis<'_>) -> bool {
    analysis.all(is_doc_path)
}

fn only_ci(analysis: &Analysis<'_>) -> bool {
    analysis.all(is_ci_path)
}

fn only_packaging(analysis: &Analysis<'_>) -> bool {
    analysis.all(is_packaging_path)
}

fn only_style(analysis: &Analysis<'_>) -> bool {
    analysis.all(is_stylesheet_path) || analysis.signals.style_only
}

fn adds_source_file(analysis: &Analysis<'_>) -> bool {
    analysis.new_source_files().next().is_some()
}

fn reworks_structure(analysis: &Analysis<'_>) -> bool {
    analysis.signals.structural_deletions && analysis.any(is_code_path)
}

fn touches_source(analysis: &Analysis<'_>) -> bool {
    analysis.any(is_code_path)
}

// ── Scope ──────────────────────────────────────────────────────────

/// Directory names that say nothing about the area of change.
const GENERIC_DIRS: &[&str] =
    &["src", "lib", "app", "source", "sources", "pkg", "internal", "main", "crates", "packages"];

const DIR_SCOPES: &[(&[&str], &str)] = &[
    (&["components", "component", "ui", "widgets", "views"], "ui"),
    (&["styles", "style", "theme", "themes", "css"], "theme"),
    (&["api", "routes", "handlers", "endpoints", "controllers"], "api"),
    (&["utils", "util", "helpers", "helper"], "utils"),
    (&["workflows"], "workflow"),
    (&["test", "tests", "__tests__", "spec", "specs"], "tests"),
    (&["docs", "doc", "documentation"], "docs"),
    (&["config", "configs", "settings"], "config"),
];

fn resolve_scope(analysis: &Analysis<'_>, commit_type: CommitType) -> Option<String> {
    let scope = packaging_scope(analysis)
        .or_else(|| ancestor_scope(analysis))
        .or_else(|| signal_scope(analysis))?;

    let type_name = commit_type.as_str();
    if scope == type_name || scope == format!("{type_name}s") {
        None
    } else {
        Some(scope)
    }
}

fn packaging_scope(analysis: &Analysis<'_>) -> Option<String> {
    if !analysis.all(is_packaging_path) {
        return None;
    }
    Some(if analysis.signals.version_bump.is_some() { "release" } else { "deps" }.to_string())
}

fn ancestor_scope(analysis: &Analysis<'_>) -> Option<String> {
    let mut common: Option<Vec<&str>> = None;
    for file in analysis.files {
        let dirs = dir_components(&file.path);
        common = Some(match common {
            None => dirs,
            Some(prefix) => {
                prefix.iter().zip(dirs.iter()).take_while(|(a, b)| a == b).map(|(a, _)| *a).collect()
            }
        });
    }

    common?
        .iter()
        .rev()
        .find(|dir| !GENERIC_DIRS.contains(dir))
        .and_then(|dir| scope_for_dir(dir))
}

fn scope_for_dir(dir: &str) -> Option<String> {
    if let Some((_, scope)) = DIR_SCOPES.iter().find(|(names, _)| names.contains(&dir)) {
        return Some((*scope).to_string());
    }
    let slug: String = dir
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    (!slug.is_empty()).then_some(slug)
}

fn signal_scope(analysis: &Analysis<'_>) -> Option<String> {
    let signals = &analysis.signals;
    let scope = if signals.style_tokens && !signals.ui_markup {
        "theme"
    } else if signals.ui_markup || !signals.new_components.is_empty() {
        "ui"
    } else if !signals.config_keys.is_empty() {
        "config"
    } else if analysis.all(is_test_path) {
        "tests"
    } else if analysis.all(is_doc_path) {
        "docs"
    } else {
        return None;
    };
    Some(scope.to_string())
}

// ── Summary ────────────────────────────────────────────────────────

struct Draft {
    commit_type: CommitType,
    scope: Option<String>,
}

struct SummaryRule {
    applies: fn(&Analysis<'_>, &Draft) -> bool,
    render: fn(&Analysis<'_>, &Draft) -> String,
}

const SUMMARY_RULES: &[SummaryRule] = &[
    SummaryRule { applies: is_release, render: release_summary },
    SummaryRule { applies: is_dependency_update, render: |_, _| "update dependencies".to_string() },
    SummaryRule { applies: adds_components, render: component_summary },
    SummaryRule { applies: |_, draft| draft.commit_type == CommitType::Feat, render: feature_summary },
    SummaryRule { applies: |_, draft| draft.commit_type == CommitType::Test, render: test_summary },
    SummaryRule { applies: |_, draft| draft.commit_type == CommitType::Ci, render: ci_summary },
    SummaryRule {
        applies: |_, draft| draft.commit_type == CommitType::Docs,
        render: |analysis, _| format!("update {}", describe_files(analysis)),
    },
    SummaryRule { applies: |_, draft| draft.commit_type == CommitType::Style, render: style_summary },
    SummaryRule {
        applies: |_, draft| draft.commit_type == CommitType::Refactor,
        render: |analysis, draft| format!("restructure {}", subject(analysis, draft)),
    },
];

fn is_release(analysis: &Analysis<'_>, draft: &Draft) -> bool {
    draft.commit_type == CommitType::Chore
        && analysis.all(is_packaging_path)
        && analysis.signals.version_bump.is_some()
}

fn release_summary(analysis: &Analysis<'_>, _draft: &Draft) -> String {
    match &analysis.signals.version_bump {
        Some(version) => format!("bump version to {version}"),
        None => "bump version".to_string(),
    }
}

fn is_dependency_update(analysis: &Analysis<'_>, draft: &Draft) -> bool {
    draft.commit_type == CommitType::Chore && analysis.all(is_packaging_path)
}

fn adds_components(analysis: &Analysis<'_>, draft: &Draft) -> bool {
    draft.commit_type == CommitType::Feat && !analysis.signals.new_components.is_empty()
}

fn component_summary(analysis: &Analysis<'_>, _draft: &Draft) -> String {
    let names: Vec<&str> = analysis.signals.new_components.iter().map(String::as_str).collect();
    let noun = if names.len() == 1 { "component" } else { "components" };
    format!("add {} {noun}", join_limited(&names))
}

fn feature_summary(analysis: &Analysis<'_>, _draft: &Draft) -> String {
    let stems: Vec<&str> =
        analysis.new_source_files().filter_map(|file| file_stem(&file.path)).collect();
    format!("add {}", join_limited(&stems))
}

fn test_summary(analysis: &Analysis<'_>, _draft: &Draft) -> String {
    let mut subjects: Vec<&str> = analysis
        .files
        .iter()
        .filter_map(|file| file_stem(&file.path))
        .map(strip_test_markers)
        .collect();
    subjects.dedup();
    format!("update tests for {}", join_limited(&subjects))
}

fn ci_summary(analysis: &Analysis<'_>, _draft: &Draft) -> String {
    match analysis.files {
        [only] => format!("update {} workflow", file_stem(&only.path).unwrap_or("ci")),
        _ => "update ci workflows".to_string(),
    }
}

fn style_summary(analysis: &Analysis<'_>, draft: &Draft) -> String {
    match draft.scope.as_deref() {
        Some("theme") => "update theme variables".to_string(),
        Some("ui") => "refine component styling".to_string(),
        _ => format!("refine styling in {}", describe_files(analysis)),
    }
}

fn subject(analysis: &Analysis<'_>, draft: &Draft) -> String {
    draft.scope.clone().unwrap_or_else(|| describe_files(analysis))
}

fn describe_files(analysis: &Analysis<'_>) -> String {
    if analysis.files.len() > MAX_LISTED_FILES {
        return format!("{} files", analysis.files.len());
    }
    analysis.files.iter().map(|file| file_name(&file.path)).collect::<Vec<_>>().join(", ")
}

fn join_limited(names: &[&str]) -> String {
    match names {
        [] => "files".to_string(),
        [only] => (*only).to_string(),
        [rest @ .., last] if names.len() <= MAX_LISTED_FILES => {
            format!("{} and {last}", rest.join(", "))
        }
        _ => format!("{} and {} more", names[..MAX_LISTED_FILES].join(", "), names.len() - MAX_LISTED_FILES),
    }
}

fn strip_test_markers(stem: &str) -> &str {
    let stem = stem.strip_prefix("test_").unwrap_or(stem);
    for suffix in [".test", ".spec", "_test", "_spec"] {
        if let Some(stripped) = stem.strip_suffix(suffix) {
            return stripped;
        }
    }
    stem
}

// ── Body ───────────────────────────────────────────────────────────

const BULLET_RULES: &[fn(&Analysis<'_>) -> Vec<String>] = &[
    added_component_bullets,
    added_file_bullets,
    removed_file_bullets,
    renamed_file_bullets,
    version_bullets,
    dependency_bullets,
    config_key_bullets,
    markup_bullets,
    theme_bullets,
    companion_bullets,
];

fn collect_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    BULLET_RULES
        .iter()
        .flat_map(|rule| rule(analysis))
        .filter(|bullet| seen.insert(bullet.clone()))
        .take(MAX_BULLETS)
        .collect()
}

fn added_component_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    analysis.signals.new_components.iter().map(|name| format!("Added {name} component")).collect()
}

fn added_file_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    analysis
        .files
        .iter()
        .filter(|file| analysis.is_new(file) && !is_component_path(&file.path))
        .map(|file| format!("Added {}", file.path))
        .collect()
}

fn removed_file_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    analysis
        .files
        .iter()
        .filter(|file| analysis.is_deleted(file))
        .map(|file| format!("Removed {}", file.path))
        .collect()
}

fn renamed_file_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    analysis
        .diff
        .files
        .iter()
        .filter_map(|file| file.old_path.as_ref().map(|old| format!("Renamed {old} to {}", file.path)))
        .collect()
}

fn version_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    analysis
        .signals
        .version_bump
        .iter()
        .map(|version| format!("Updated package version to {version}"))
        .collect()
}

fn dependency_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    if analysis.signals.dependency_change {
        vec!["Updated dependency manifests".to_string()]
    } else {
        Vec::new()
    }
}

fn config_key_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    let keys: Vec<&str> = analysis.signals.config_keys.iter().map(String::as_str).collect();
    if keys.is_empty() {
        Vec::new()
    } else {
        vec![format!("Updated configuration keys: {}", join_limited(&keys))]
    }
}

fn markup_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    if analysis.signals.ui_markup {
        vec!["Updated markup and class bindings".to_string()]
    } else {
        Vec::new()
    }
}

fn theme_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    if analysis.signals.style_tokens {
        vec!["Updated theme variables and style rules".to_string()]
    } else {
        Vec::new()
    }
}

/// Tests or docs that ride along with other changes.
fn companion_bullets(analysis: &Analysis<'_>) -> Vec<String> {
    let mut bullets = Vec::new();
    if analysis.any(is_test_path) && !analysis.all(is_test_path) {
        bullets.push("Updated tests".to_string());
    }
    if analysis.any(is_doc_path) && !analysis.all(is_doc_path) {
        bullets.push("Updated documentation".to_string());
    }
    bullets
}

// ── Breaking changes ───────────────────────────────────────────────

fn detect_breaking(analysis: &Analysis<'_>, commit_type: CommitType) -> Option<String> {
    explicit_breaking(analysis).or_else(|| {
        if commit_type == CommitType::Refactor {
            signature_change(analysis)
        } else {
            None
        }
    })
}

fn explicit_breaking(analysis: &Analysis<'_>) -> Option<String> {
    analysis.diff.additions().find_map(|(path, line)| {
        let captures = breaking_marker().captures(line)?;
        let text = captures
            .get(1)
            .map(|m| m.as_str().trim().trim_end_matches("*/").trim().trim_end_matches("-->").trim())
            .unwrap_or_default();
        Some(if text.is_empty() {
            format!("breaking change flagged in {path}")
        } else {
            text.to_string()
        })
    })
}

fn signature_change(analysis: &Analysis<'_>) -> Option<String> {
    let mut removed: BTreeMap<(&str, String), String> = BTreeMap::new();
    for (path, line) in analysis.diff.deletions() {
        if let Some((name, params)) = public_signature(line) {
            removed.entry((path, name)).or_insert(params);
        }
    }

    analysis.diff.additions().find_map(|(path, line)| {
        let (name, params) = public_signature(line)?;
        let old = removed.get(&(path, name.clone()))?;
        (old != &params).then(|| format!("`{name}` signature changed from ({old}) to ({params})"))
    })
}

/// Truncate to `max_len` characters, breaking at a word boundary when possible.
fn truncate_header(header: &str, max_len: usize) -> String {
    if header.chars().count() <= max_len {
        return header.to_string();
    }
    let truncated: String = header.chars().take(max_len).collect();
    match truncated.rfind(' ') {
        Some(pos) if pos > max_len / 2 => truncated[..pos].to_string(),
        _ => truncated,
    }
}
