#![forbid(unsafe_code)]

//! On-disk diagnostic cache and body cache keys.

use std::fs;
use std::path::Path;

use blossom_ast::{Decl, Unit};
use blossom_core::{CheckConfig, DiagnosticCache};
use miette::IntoDiagnostic;
use sha2::Digest;

/// Read the cache file; a missing or unreadable cache starts empty.
pub fn load(path: &Path) -> DiagnosticCache {
    let Ok(raw) = fs::read_to_string(path) else {
        return DiagnosticCache::new();
    };
    match serde_json::from_str(&raw) {
        Ok(cache) => cache,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "ignoring corrupt diagnostic cache");
            DiagnosticCache::new()
        }
    }
}

pub fn save(path: &Path, cache: &DiagnosticCache) -> miette::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).into_diagnostic()?;
    }
    let json = serde_json::to_string(cache).into_diagnostic()?;
    fs::write(path, json).into_diagnostic()?;
    tracing::debug!(path = %path.display(), entries = cache.len(), "diagnostic cache saved");
    Ok(())
}

/// Give every function without a cache key one derived from its contents.
///
/// The key covers the function itself, every non-function declaration (the
/// catalog it is checked against) and the check budgets, so editing a type
/// or changing a limit invalidates the cached result.
pub fn fill_cache_keys(unit: &mut Unit, config: &CheckConfig) -> miette::Result<()> {
    let mut context = sha2::Sha256::new();
    context.update(serde_json::to_vec(config).into_diagnostic()?);
    for decl in &unit.decls {
        if !matches!(decl, Decl::Function(_)) {
            context.update(serde_json::to_vec(decl).into_diagnostic()?);
        }
    }

    for decl in &mut unit.decls {
        let Decl::Function(f) = decl else {
            continue;
        };
        if f.cache_key.is_some() {
            continue;
        }
        let mut hasher = context.clone();
        hasher.update(serde_json::to_vec(&*f).into_diagnostic()?);
        f.cache_key = Some(hex::encode(hasher.finalize()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blossom_ast::builder::*;

    fn keys(unit: &Unit) -> Vec<Option<String>> {
        unit.functions().map(|f| f.cache_key.clone()).collect()
    }

    #[test]
    fn keys_track_the_body_and_the_declarations_around_it() {
        let base = unit(
            "u",
            vec![
                record("P", vec![("x", int())]),
                Decl::Function(function("f", vec![("p", named("P"))], vec![])),
                Decl::Function(function("g", vec![], vec![])),
            ],
        );
        let config = CheckConfig::default();

        let mut a = base.clone();
        fill_cache_keys(&mut a, &config).expect("keys");
        let mut again = base.clone();
        fill_cache_keys(&mut again, &config).expect("keys");
        assert_eq!(keys(&a), keys(&again));
        assert_ne!(keys(&a)[0], keys(&a)[1]);

        let mut edited = base.clone();
        if let Decl::Record(r) = &mut edited.decls[0] {
            r.fields[0].ty = str_ty();
        }
        fill_cache_keys(&mut edited, &config).expect("keys");
        assert_ne!(keys(&a)[0], keys(&edited)[0]);
    }

    #[test]
    fn explicit_keys_are_kept() {
        let mut f = function("f", vec![], vec![]);
        f.cache_key = Some("mine".into());
        let mut u = unit("u", vec![Decl::Function(f)]);
        fill_cache_keys(&mut u, &CheckConfig::default()).expect("keys");
        assert_eq!(keys(&u), vec![Some("mine".to_string())]);
    }
}
