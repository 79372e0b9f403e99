//! Variable scope stack (component C1).
//!
//! A `Scope` layers five flat string maps — builtin, global, environment,
//! collection, local — and resolves `{{name}}` interpolation in a single left
//! to right pass. Unresolved names and unmatched braces are left verbatim
//! rather than erroring, so a script can render a request body that still
//! contains a `{{` sequence meant for a different templating stage.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Scope {
    builtin: HashMap<String, String>,
    global: HashMap<String, String>,
    environment: HashMap<String, String>,
    collection: HashMap<String, String>,
    local: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Builtin,
    Global,
    Environment,
    Collection,
    Local,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame_mut(&mut self, frame: Frame) -> &mut HashMap<String, String> {
        match frame {
            Frame::Builtin => &mut self.builtin,
            Frame::Global => &mut self.global,
            Frame::Environment => &mut self.environment,
            Frame::Collection => &mut self.collection,
            Frame::Local => &mut self.local,
        }
    }

    pub fn set(&mut self, frame: Frame, name: impl Into<String>, value: impl Into<String>) {
        self.frame_mut(frame).insert(name.into(), value.into());
    }

    pub fn extend(&mut self, frame: Frame, vars: impl IntoIterator<Item = (String, String)>) {
        self.frame_mut(frame).extend(vars);
    }

    /// Resolve a variable by name, highest-precedence frame first:
    /// local > environment > collection > global > builtin.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.local
            .get(name)
            .or_else(|| self.environment.get(name))
            .or_else(|| self.collection.get(name))
            .or_else(|| self.global.get(name))
            .or_else(|| self.builtin.get(name))
            .map(String::as_str)
    }

    /// Interpolate every `{{name}}` occurrence in `input`, leaving unresolved
    /// names and unmatched `{{`/`}}` untouched.
    pub fn interpolate(&self, input: &str) -> String {
        let bytes = input.as_bytes();
        let mut out = String::with_capacity(input.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                if let Some(end) = find_close(bytes, i + 2) {
                    let name = input[i + 2..end].trim();
                    match self.get(name) {
                        Some(value) => {
                            out.push_str(value);
                            i = end + 2;
                            continue;
                        }
                        None => {
                            // Leave the whole token verbatim.
                            out.push_str(&input[i..end + 2]);
                            i = end + 2;
                            continue;
                        }
                    }
                }
            }
            let ch = input[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }

    pub fn as_flat_map(&self) -> HashMap<String, String> {
        let mut flat = self.builtin.clone();
        flat.extend(self.global.clone());
        flat.extend(self.collection.clone());
        flat.extend(self.environment.clone());
        flat.extend(self.local.clone());
        flat
    }
}

fn find_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'}' && bytes[i + 1] == b'}' {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_variable() {
        let mut scope = Scope::new();
        scope.set(Frame::Environment, "host", "example.com");
        assert_eq!(scope.interpolate("https://{{host}}/ping"), "https://example.com/ping");
    }

    #[test]
    fn leaves_unresolved_names_verbatim() {
        let scope = Scope::new();
        assert_eq!(scope.interpolate("{{missing}}"), "{{missing}}");
    }

    #[test]
    fn leaves_unmatched_braces_verbatim() {
        let scope = Scope::new();
        assert_eq!(scope.interpolate("{{ not closed"), "{{ not closed");
    }

    #[test]
    fn local_beats_environment_beats_collection() {
        let mut scope = Scope::new();
        scope.set(Frame::Collection, "v", "collection");
        scope.set(Frame::Environment, "v", "environment");
        scope.set(Frame::Local, "v", "local");
        assert_eq!(scope.get("v"), Some("local"));
        scope.frame_mut_for_test(Frame::Local).remove("v");
        assert_eq!(scope.get("v"), Some("environment"));
    }

    #[test]
    fn trims_whitespace_inside_braces() {
        let mut scope = Scope::new();
        scope.set(Frame::Global, "id", "42");
        assert_eq!(scope.interpolate("{{ id }}"), "42");
    }

    impl Scope {
        fn frame_mut_for_test(&mut self, frame: Frame) -> &mut HashMap<String, String> {
            self.frame_mut(frame)
        }
    }
}
