// Hardware address normalization.
//
// Switches and operators write the same address many ways: `AA-BB-CC-DD-EE-FF`,
// `aabb.ccdd.eeff`, `aa:bb:cc:dd:ee:ff`, `0:1b:...`. Everything is stored and
// compared in the lowercase colon form.

use std::fmt;
use std::str::FromStr;

use crate::error::TrackerError;

const SEPARATORS: [char; 3] = [':', '-', '.'];

/// A 6-octet hardware address. `Display` renders the canonical form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn from_octets(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for MacAddress {
    type Err = TrackerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || TrackerError::InvalidAddress(input.to_string());
        let groups: Vec<&str> = input.trim().split(&SEPARATORS[..]).collect();
        if groups
            .iter()
            .any(|g| g.is_empty() || !g.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        // Six short groups: `0:1b:c:...` style, each group is one octet.
        if groups.len() == 6 && groups.iter().all(|g| g.len() <= 2) {
            for (octet, group) in octets.iter_mut().zip(&groups) {
                *octet = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
            }
            return Ok(MacAddress(octets));
        }

        let digits = groups.concat();
        if digits.len() != 12 {
            return Err(invalid());
        }
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(MacAddress(octets))
    }
}

/// Canonicalize any textual address, e.g. `AABB.CCDD.EEFF` -> `aa:bb:cc:dd:ee:ff`.
pub fn normalize(input: &str) -> Result<String, TrackerError> {
    input.parse::<MacAddress>().map(|mac| mac.to_string())
}

/// A partial address: 1 to 12 hex digits, separators ignored, lowercase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexFragment(String);

impl HexFragment {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substring patterns over the canonical colon form that together match
    /// exactly the addresses whose twelve hex digits contain the fragment.
    ///
    /// A run of hex digits lands in the colon form at one of two phases: it
    /// starts on an octet boundary, or on the second digit of an octet. Colons
    /// in the pattern can only line up with colons in the address, so each
    /// pattern is exact.
    pub fn patterns(&self) -> Vec<String> {
        let digits: Vec<char> = self.0.chars().collect();
        let mut patterns = vec![with_colons(&digits, 0)];
        let shifted = with_colons(&digits, 1);
        if !patterns.contains(&shifted) {
            patterns.push(shifted);
        }
        patterns
    }
}

// Insert a colon before each digit that starts an octet, given the phase of
// the first digit within its octet.
fn with_colons(digits: &[char], phase: usize) -> String {
    let mut pattern = String::with_capacity(digits.len() * 3 / 2);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (i + phase) % 2 == 0 {
            pattern.push(':');
        }
        pattern.push(*digit);
    }
    pattern
}

impl FromStr for HexFragment {
    type Err = TrackerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let digits: String = input
            .trim()
            .chars()
            .filter(|c| !SEPARATORS.contains(c))
            .collect();
        if digits.is_empty() || digits.len() > 12 || !digits.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(TrackerError::InvalidAddress(input.to_string()));
        }
        Ok(HexFragment(digits.to_ascii_lowercase()))
    }
}

/// What a lookup string resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    Exact(MacAddress),
    Fragment(HexFragment),
}

impl FromStr for Query {
    type Err = TrackerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Ok(mac) = input.parse::<MacAddress>() {
            return Ok(Query::Exact(mac));
        }
        input.parse::<HexFragment>().map(Query::Fragment)
    }
}
