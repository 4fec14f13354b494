//! Address Resolver (C1): maps an arbitrary address to its owning [`Account`].
//!
//! Pure and synchronous — no I/O, no locks — so the idempotence invariants
//! are directly unit-testable.

use crate::account::Account;

/// Lower-cases an address and, for Gmail/Googlemail domains, strips any
/// `+tag` suffix and all `.` characters from the local part. Idempotent:
/// `canonicalize(canonicalize(x)) == canonicalize(x)`.
#[must_use]
pub fn canonicalize(addr: &str) -> String {
    let addr = strip_display_name(addr).to_lowercase();
    let Some((local, domain)) = addr.split_once('@') else {
        return addr;
    };

    if domain != "gmail.com" && domain != "googlemail.com" {
        return format!("{local}@{domain}");
    }

    let local = local.split('+').next().unwrap_or(local);
    let local: String = local.chars().filter(|c| *c != '.').collect();
    format!("{local}@{domain}")
}

/// Strips a `Name <addr>` wrapper down to the bare address, if present.
#[must_use]
pub fn strip_display_name(addr: &str) -> &str {
    if let (Some(start), Some(end)) = (addr.find('<'), addr.find('>')) {
        if end > start {
            return addr[start + 1..end].trim();
        }
    }
    addr.trim()
}

/// Extracts the lower-cased domain portion of an address, or `None` if there
/// is no `@`.
#[must_use]
pub fn domain_of(addr: &str) -> Option<String> {
    strip_display_name(addr)
        .rsplit_once('@')
        .map(|(_, d)| d.to_lowercase())
}

/// Resolves `addr` to the owning account among `accounts`, in order: exact
/// match, Gmail-alias canonical match, domain catch-all, else not found.
#[must_use]
pub fn resolve<'a>(addr: &str, accounts: &'a [Account]) -> Option<&'a Account> {
    let bare = strip_display_name(addr).to_lowercase();

    if let Some(account) = accounts
        .iter()
        .find(|a| a.address().to_lowercase() == bare)
    {
        return Some(account);
    }

    let canonical = canonicalize(addr);
    if canonical != bare {
        if let Some(account) = accounts
            .iter()
            .find(|a| canonicalize(a.address()) == canonical)
        {
            return Some(account);
        }
    }

    let domain = domain_of(addr)?;
    accounts.iter().find(|a| {
        a.is_domain_catchall
            && a.catchall_domain
                .as_deref()
                .map(|d| d.to_lowercase())
                .as_deref()
                == Some(domain.as_str())
    })
}

/// `true` if `candidate` is addressed to `account` per the resolver's
/// normalization rules (used by the fetcher/waiter to filter To/Cc/Bcc
/// entries against the owning account).
#[must_use]
pub fn addressed_to(candidate: &str, account: &Account) -> bool {
    let candidate_bare = strip_display_name(candidate).to_lowercase();
    if candidate_bare == account.address().to_lowercase() {
        return true;
    }
    if canonicalize(candidate) == canonicalize(account.address()) {
        return true;
    }
    if account.is_domain_catchall {
        if let Some(domain) = domain_of(candidate) {
            if account
                .catchall_domain
                .as_deref()
                .map(|d| d.to_lowercase())
                .as_deref()
                == Some(domain.as_str())
            {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: u64, address: &str) -> Account {
        Account::builder()
            .id(id)
            .address(address)
            .password("x")
            .build()
            .unwrap()
    }

    fn catchall_account(id: u64, address: &str, domain: &str) -> Account {
        Account::builder()
            .id(id)
            .address(address)
            .password("x")
            .catchall_domain(domain)
            .build()
            .unwrap()
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let x = "john.doe+work@gmail.com";
        assert_eq!(canonicalize(canonicalize(x).as_str()), canonicalize(x));
    }

    #[test]
    fn canonicalize_strips_tag_and_dots_for_gmail() {
        assert_eq!(canonicalize("john.doe+work@gmail.com"), "johndoe@gmail.com");
        assert_eq!(
            canonicalize("john.doe+work@googlemail.com"),
            "johndoe@googlemail.com"
        );
    }

    #[test]
    fn canonicalize_leaves_non_gmail_domains_alone() {
        assert_eq!(
            canonicalize("john.doe+work@example.com"),
            "john.doe+work@example.com"
        );
    }

    #[test]
    fn seed_scenario_gmail_alias_resolution() {
        let accounts = vec![account(1, "johndoe@gmail.com")];
        assert_eq!(
            resolve("john.doe+work@gmail.com", &accounts).map(|a| a.id),
            Some(1)
        );
        assert_eq!(
            resolve("john.doe+work@googlemail.com", &accounts).map(|a| a.id),
            Some(1)
        );
    }

    #[test]
    fn resolve_is_consistent_with_canonical_form() {
        let accounts = vec![account(1, "johndoe@gmail.com")];
        let x = "john.doe+work@gmail.com";
        assert_eq!(
            resolve(&canonicalize(x), &accounts).map(|a| a.id),
            resolve(x, &accounts).map(|a| a.id)
        );
    }

    #[test]
    fn seed_scenario_domain_catchall() {
        let accounts = vec![catchall_account(1, "catchall@example.org", "example.org")];
        assert_eq!(
            resolve("anything@example.org", &accounts).map(|a| a.id),
            Some(1)
        );
        assert_eq!(resolve("anything@other.org", &accounts), None);
    }

    #[test]
    fn resolve_prefers_exact_match_over_catchall() {
        let accounts = vec![
            catchall_account(1, "catchall@example.org", "example.org"),
            account(2, "specific@example.org"),
        ];
        assert_eq!(
            resolve("specific@example.org", &accounts).map(|a| a.id),
            Some(2)
        );
    }

    #[test]
    fn addressed_to_strips_display_name_wrapper() {
        let account = account(1, "me@example.com");
        assert!(addressed_to("\"Jane\" <me@example.com>", &account));
    }

    #[test]
    fn not_found_when_no_account_matches() {
        let accounts = vec![account(1, "me@example.com")];
        assert!(resolve("nobody@elsewhere.com", &accounts).is_none());
    }
}
