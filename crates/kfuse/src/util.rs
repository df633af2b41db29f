use crate::visit;
use indexmap::IndexMap;
use std::path::{Component, Path, PathBuf};

/// Replaces whole name tokens with their new names
///
/// Counts the strings it changed.
#[derive(derive_new::new)]
pub(crate) struct NameRewriter<'r> {
    renames: &'r [(&'r str, &'r str)],
    #[new(default)]
    rewritten: usize,
}

impl NameRewriter<'_> {
    pub(crate) fn rewritten(&self) -> usize {
        self.rewritten
    }
}

impl visit::VisitMut<String> for NameRewriter<'_> {
    #[tracing::instrument(level = "trace", skip_all)]
    fn visit_mut(&mut self, value: &mut String) {
        let Some(replaced) = replace_name_tokens(value, self.renames) else {
            return;
        };

        tracing::trace!(from=%value, to=%replaced, "name reference");
        *value = replaced;
        self.rewritten += 1;
    }
}

/// Expands `$(NAME)` with known variables, `$$` is a literal `$`
#[derive(derive_new::new)]
pub(crate) struct VarRewriter<'v> {
    vars: &'v IndexMap<String, String>,
    #[new(default)]
    rewritten: usize,
}

impl VarRewriter<'_> {
    pub(crate) fn rewritten(&self) -> usize {
        self.rewritten
    }
}

impl visit::VisitMut<String> for VarRewriter<'_> {
    fn visit_mut(&mut self, value: &mut String) {
        if let Some(expanded) = expand_vars(value, self.vars) {
            *value = expanded;
            self.rewritten += 1;
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// `None` when nothing matched
///
/// An old name only matches as a whole token, so `cm` matches in `cm` or `cm.yaml` but not in
/// `my-cm`. The text is scanned once from left to right, replaced text is never matched again.
pub(crate) fn replace_name_tokens(text: &str, renames: &[(&str, &str)]) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut rest = text;
    let mut previous: Option<char> = None;

    while let Some(c) = rest.chars().next() {
        if previous.map_or(true, |p| !is_name_char(p)) {
            let hit = renames
                .iter()
                .filter(|(from, _)| {
                    !from.is_empty()
                        && rest.starts_with(from)
                        && rest[from.len()..]
                            .chars()
                            .next()
                            .map_or(true, |next| !is_name_char(next))
                })
                .max_by_key(|(from, _)| from.len());

            if let Some((from, to)) = hit {
                out.push_str(to);
                rest = &rest[from.len()..];
                previous = from.chars().last();
                changed = true;
                continue;
            }
        }

        out.push(c);
        rest = &rest[c.len_utf8()..];
        previous = Some(c);
    }

    changed.then_some(out)
}

/// `None` when nothing was expanded or escaped
pub(crate) fn expand_vars(text: &str, vars: &IndexMap<String, String>) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut rest = text;

    while let Some(index) = rest.find('$') {
        out.push_str(&rest[..index]);
        rest = &rest[index..];

        if let Some(after) = rest.strip_prefix("$$") {
            out.push('$');
            rest = after;
            changed = true;
            continue;
        }

        let reference = rest
            .strip_prefix("$(")
            .and_then(|after| after.split_once(')'));
        match reference {
            Some((name, after)) => match vars.get(name) {
                Some(value) => {
                    out.push_str(value);
                    rest = after;
                    changed = true;
                }
                None => {
                    let consumed = name.len() + 3;
                    out.push_str(&rest[..consumed]);
                    rest = &rest[consumed..];
                }
            },
            None => {
                out.push('$');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);

    changed.then_some(out)
}

/// Lexically cleaned path: no `.` components, `..` resolved where possible
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
