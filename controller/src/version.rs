//! Protocol version compatibility between the controller and its computes

/// Version of this controller build
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extract `(major, minor)` from a version string such as `2.0.1`, `v2.1`
/// or `2.0.0dev3`. A missing minor counts as 0.
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    let mut components = version.split('.');

    let major = leading_number(components.next()?)?;
    let minor = components.next().and_then(leading_number).unwrap_or(0);

    Some((major, minor))
}

fn leading_number(component: &str) -> Option<u32> {
    let digits: String = component.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// A compute is compatible when its major.minor matches ours
pub fn is_compatible(local: &str, remote: &str) -> bool {
    match (parse_version(local), parse_version(remote)) {
        (Some(local), Some(remote)) => local == remote,
        _ => false,
    }
}
