//! Selecting kstats by `module:instance:name:statistic` patterns.
//!
//! The syntax is the one `kstat(1M)` accepts. Each part may be left empty
//! or given as `*` to match anything, and trailing parts may be omitted:
//!
//! ```text
//!  cpu_stat            every kstat of module cpu_stat
//!  cpu_stat:0          ... instance 0 only
//!  :::rtime            every kstat that has an rtime statistic
//!  unix:0:system_misc:ncpus
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::model::{Kstat, KstatHeader, KstatType};
use crate::source::KstatSource;

/// A malformed filter pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// More than four `:`-separated parts.
    TooManyParts(String),
    /// The instance part is neither a wildcard nor an integer.
    BadInstance(String),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::TooManyParts(s) => {
                write!(f, "invalid filter '{}': at most module:instance:name:statistic", s)
            }
            FilterError::BadInstance(s) => write!(f, "invalid instance '{}' in filter", s),
        }
    }
}

impl std::error::Error for FilterError {}

/// One parsed pattern. `None` parts are wildcards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FilterSpec {
    pub module: Option<String>,
    pub instance: Option<i32>,
    pub name: Option<String>,
    pub statistic: Option<String>,
}

fn part(s: &str) -> Option<String> {
    if s.is_empty() || s == "*" {
        None
    } else {
        Some(s.to_string())
    }
}

impl FromStr for FilterSpec {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() > 4 {
            return Err(FilterError::TooManyParts(s.to_string()));
        }
        let instance = match parts.get(1).and_then(|p| part(p)) {
            Some(p) => Some(p.parse().map_err(|_| FilterError::BadInstance(p))?),
            None => None,
        };
        Ok(FilterSpec {
            module: parts.first().and_then(|p| part(p)),
            instance,
            name: parts.get(2).and_then(|p| part(p)),
            statistic: parts.get(3).and_then(|p| part(p)),
        })
    }
}

impl FilterSpec {
    /// Whether module, instance and name match; the statistic is ignored.
    pub fn matches_triplet(&self, header: &KstatHeader) -> bool {
        let id = &header.id;
        self.module.as_deref().is_none_or(|m| m == id.module)
            && self.instance.is_none_or(|i| i == id.instance)
            && self.name.as_deref().is_none_or(|n| n == id.name)
    }
}

/// What can be decided from a header alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Verdict {
    Reject,
    Accept,
    /// A matching positive filter names a statistic; only the data can tell.
    NeedsData,
}

/// A set of positive and negative patterns plus optional class and type
/// restrictions.
///
/// A kstat is selected when it has the class and type asked for, matches
/// no negative pattern, and matches at least one positive pattern (or no
/// positive pattern was given).
#[derive(Clone, Debug, Default)]
pub struct KstatFilter {
    positive: Vec<FilterSpec>,
    negative: Vec<FilterSpec>,
    class: Option<String>,
    kstat_type: Option<KstatType>,
}

impl KstatFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, spec: &str) -> Result<&mut Self, FilterError> {
        self.positive.push(spec.parse()?);
        Ok(self)
    }

    pub fn add_negative_filter(&mut self, spec: &str) -> Result<&mut Self, FilterError> {
        self.negative.push(spec.parse()?);
        Ok(self)
    }

    pub fn add_spec(&mut self, spec: FilterSpec) -> &mut Self {
        self.positive.push(spec);
        self
    }

    pub fn set_class(&mut self, class: impl Into<String>) -> &mut Self {
        self.class = Some(class.into());
        self
    }

    pub fn set_type(&mut self, kstat_type: KstatType) -> &mut Self {
        self.kstat_type = Some(kstat_type);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty()
            && self.negative.is_empty()
            && self.class.is_none()
            && self.kstat_type.is_none()
    }

    fn verdict(&self, header: &KstatHeader) -> Verdict {
        if self.class.as_deref().is_some_and(|c| c != header.class) {
            return Verdict::Reject;
        }
        if self.kstat_type.is_some_and(|t| t != header.kstat_type) {
            return Verdict::Reject;
        }
        if self.negative.iter().any(|f| f.matches_triplet(header)) {
            return Verdict::Reject;
        }
        if self.positive.is_empty() {
            return Verdict::Accept;
        }
        let mut verdict = Verdict::Reject;
        for f in self.positive.iter().filter(|f| f.matches_triplet(header)) {
            if f.statistic.is_none() {
                return Verdict::Accept;
            }
            verdict = Verdict::NeedsData;
        }
        verdict
    }

    /// Header-level check. Statistic parts of positive patterns are not
    /// evaluated, so this may accept a kstat [`matches_kstat`] rejects.
    ///
    /// [`matches_kstat`]: KstatFilter::matches_kstat
    pub fn matches(&self, header: &KstatHeader) -> bool {
        self.verdict(header) != Verdict::Reject
    }

    /// Full check against a read kstat.
    pub fn matches_kstat(&self, kstat: &Kstat) -> bool {
        let header = kstat.header();
        match self.verdict(&header) {
            Verdict::Reject => false,
            Verdict::Accept => true,
            Verdict::NeedsData => self.positive.iter().any(|f| {
                f.matches_triplet(&header)
                    && f.statistic.as_deref().is_some_and(|s| kstat.has_statistic(s))
            }),
        }
    }

    /// Lists the source and reads every selected kstat, in sorted order.
    /// Each kstat is read at most once; kstats that vanish before they can
    /// be read are left out.
    pub fn select<S: KstatSource + ?Sized>(&self, source: &S) -> Vec<Kstat> {
        let mut selected: Vec<Kstat> = source
            .headers()
            .into_iter()
            .filter(|h| self.matches(h))
            .filter_map(|h| source.get_kstat(&h.id.module, h.id.instance, &h.id.name))
            .filter(|ks| self.matches_kstat(ks))
            .collect();
        selected.sort();
        trace!(selected = selected.len(), "filter applied");
        selected
    }

    /// The statistics of `kstat` to report: those named by matching
    /// positive patterns, or all of them if no such pattern names one.
    pub fn filtered_statistics<'a>(&self, kstat: &'a Kstat) -> Vec<&'a str> {
        let header = kstat.header();
        let named: Vec<&'a str> = kstat
            .statistics()
            .filter(|stat| {
                self.positive.iter().any(|f| {
                    f.matches_triplet(&header) && f.statistic.as_deref() == Some(*stat)
                })
            })
            .collect();
        if named.is_empty() {
            kstat.statistics().collect()
        } else {
            named
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChain;
    use crate::model::KstatId;
    use crate::session::Session;

    fn header(module: &str, instance: i32, name: &str, class: &str, ty: KstatType) -> KstatHeader {
        KstatHeader {
            id: KstatId::new(module, instance, name),
            class: class.to_string(),
            kstat_type: ty,
            crtime: 0,
        }
    }

    #[test]
    fn test_parse_specs() {
        let f: FilterSpec = "cpu_stat".parse().unwrap();
        assert_eq!(f.module.as_deref(), Some("cpu_stat"));
        assert_eq!(f.instance, None);

        let f: FilterSpec = "unix:0:system_misc:ncpus".parse().unwrap();
        assert_eq!(f.instance, Some(0));
        assert_eq!(f.name.as_deref(), Some("system_misc"));
        assert_eq!(f.statistic.as_deref(), Some("ncpus"));

        let f: FilterSpec = "*::sd0".parse().unwrap();
        assert_eq!(f.module, None);
        assert_eq!(f.instance, None);
        assert_eq!(f.name.as_deref(), Some("sd0"));

        assert_eq!("".parse::<FilterSpec>().unwrap(), FilterSpec::default());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "a:1:b:c:d".parse::<FilterSpec>(),
            Err(FilterError::TooManyParts("a:1:b:c:d".into()))
        );
        assert_eq!(
            "sd:one".parse::<FilterSpec>(),
            Err(FilterError::BadInstance("one".into()))
        );
    }

    #[test]
    fn test_header_matching() {
        let mut f = KstatFilter::new();
        f.add_filter("sd").unwrap().add_negative_filter("sd:1").unwrap();
        assert!(f.matches(&header("sd", 0, "sd0", "disk", KstatType::Io)));
        assert!(!f.matches(&header("sd", 1, "sd1", "disk", KstatType::Io)));
        assert!(!f.matches(&header("cpu", 0, "sys", "misc", KstatType::Named)));

        let mut f = KstatFilter::new();
        f.set_class("disk");
        assert!(f.matches(&header("sd", 0, "sd0", "disk", KstatType::Io)));
        assert!(!f.matches(&header("unix", 0, "var", "misc", KstatType::Raw)));

        let mut f = KstatFilter::new();
        f.set_type(KstatType::Raw);
        assert!(f.matches(&header("unix", 0, "var", "misc", KstatType::Raw)));
        assert!(!f.matches(&header("sd", 0, "sd0", "disk", KstatType::Io)));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let f = KstatFilter::new();
        assert!(f.is_empty());
        assert!(f.matches(&header("any", 3, "thing", "misc", KstatType::Named)));
    }

    #[test]
    fn test_select_with_statistic() {
        let s = Session::new(MockChain::typical_system());
        let mut f = KstatFilter::new();
        f.add_filter(":::rcnt").unwrap();
        let selected = f.select(&s);
        let names: Vec<String> = selected.iter().map(Kstat::triplet).collect();
        assert_eq!(names, vec!["nfs:1:nfs1", "sd:0:sd0", "sd:1:sd1"]);

        for ks in &selected {
            assert_eq!(f.filtered_statistics(ks), vec!["rcnt"]);
        }
    }

    #[test]
    fn test_select_module_sorted_naturally() {
        let s = Session::new(MockChain::typical_system());
        let mut f = KstatFilter::new();
        f.add_filter("cpu_stat").unwrap();
        let selected = f.select(&s);
        let names: Vec<&str> = selected.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["cpu_stat0", "cpu_stat1"]);
        assert_eq!(f.filtered_statistics(&selected[0]).len(), 82);
    }

    #[test]
    fn test_missing_statistic_rejects() {
        let s = Session::new(MockChain::typical_system());
        let mut f = KstatFilter::new();
        f.add_filter("unix:0:system_misc:no_such_stat").unwrap();
        assert!(f.select(&s).is_empty());
    }
}
