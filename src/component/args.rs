//! Effective-argument merging (spec §4.1, testable property 6).
//!
//! `effectiveArgs` starts as a copy of the component's own `args`. Walking
//! from the component towards the root, each ancestor's `defaultArgs[k]=v`
//! is folded in: `pod.args`/`pod.env` concatenate (own value stays a
//! prefix), everything else only fills a gap (child wins).

use indexmap::IndexMap;

const CONCAT_KEYS: [&str; 2] = ["pod.args", "pod.env"];

/// Computes `effectiveArgs` for a component given its own `args` and the
/// `defaultArgs` of every ancestor, ordered nearest-ancestor-first (i.e.
/// `ancestors[0]` is the direct parent, `ancestors.last()` is the root).
pub fn merge(
    own_args: &IndexMap<String, String>,
    ancestors_default_args: impl IntoIterator<Item = impl AsRef<IndexMap<String, String>>>,
) -> IndexMap<String, String> {
    let mut effective = own_args.clone();

    for default_args in ancestors_default_args {
        for (key, value) in default_args.as_ref() {
            if CONCAT_KEYS.contains(&key.as_str()) {
                let entry = effective.entry(key.clone()).or_default();
                if entry.is_empty() {
                    *entry = value.clone();
                } else {
                    entry.push(' ');
                    entry.push_str(value);
                }
            } else {
                effective.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    effective
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn own_value_wins_over_ancestor_default() {
        let own = map(&[("image", "nginx:own")]);
        let parent_defaults = map(&[("image", "nginx:parent")]);
        let result = merge(&own, [&parent_defaults]);
        assert_eq!(result.get("image").unwrap(), "nginx:own");
    }

    #[test]
    fn nearest_ancestor_wins_when_own_absent() {
        let own = map(&[]);
        let parent = map(&[("namespace", "from-parent")]);
        let grandparent = map(&[("namespace", "from-grandparent")]);
        let result = merge(&own, [&parent, &grandparent]);
        assert_eq!(result.get("namespace").unwrap(), "from-parent");
    }

    #[test]
    fn pod_args_concatenate_with_own_as_prefix() {
        let own = map(&[("pod.args", "--own-flag")]);
        let parent = map(&[("pod.args", "--parent-flag")]);
        let result = merge(&own, [&parent]);
        assert_eq!(result.get("pod.args").unwrap(), "--own-flag --parent-flag");
    }

    #[test]
    fn pod_env_concatenates_across_multiple_ancestors() {
        let own = map(&[("pod.env", "A=1")]);
        let parent = map(&[("pod.env", "B=2")]);
        let grandparent = map(&[("pod.env", "C=3")]);
        let result = merge(&own, [&parent, &grandparent]);
        assert_eq!(result.get("pod.env").unwrap(), "A=1 B=2 C=3");
    }

    #[test]
    fn unrelated_keys_pass_through_untouched() {
        let own = map(&[("port", "8080")]);
        let result = merge(&own, [] as [&IndexMap<String, String>; 0]);
        assert_eq!(result.get("port").unwrap(), "8080");
    }
}
