use anyhow::{Context, Result};
use duct::cmd;

/// Expansion of a package set into its full AUR dependency closure.
pub trait DependencyResolver {
    /// The given packages plus all their transitive AUR dependencies, in
    /// build order (dependencies before dependents).
    fn closure(&self, packages: &[String]) -> Result<Vec<String>>;
}

/// Resolver backed by `aur depends` piped through `tsort`.
pub struct AurDepends;

impl DependencyResolver for AurDepends {
    fn closure(&self, packages: &[String]) -> Result<Vec<String>> {
        if packages.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["depends".to_string(), "--reverse".to_string()];
        args.extend(packages.iter().cloned());
        // aur depends emits the dependency edges, tsort orders them
        let output = cmd("aur", args)
            .pipe(cmd!("tsort"))
            .read()
            .context("resolving AUR dependencies")?;
        Ok(output.lines().map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_resolves_to_nothing() {
        // Must not shell out; aur is likely not even installed here
        let closure = AurDepends.closure(&[]).unwrap();
        assert!(closure.is_empty());
    }
}
