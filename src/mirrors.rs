//! Gentoo mirror directory, grouped by country.
//!
//! The built-in table lists HTTP mirrors from the Gentoo mirror page. Extra
//! mirrors from the configuration file are merged on top, and the table can
//! be refreshed from the live mirror page.
use crate::config::ExtraMirror;
use crate::error::{GensystemError, Result};
use rand::seq::IndexedRandom;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Page listing every official mirror, one `<h3 id="CC">` section per country.
pub const GENTOO_MIRRORS_URL: &str = "https://www.gentoo.org/downloads/mirrors/";

/// Mirror page codes of the countries the tool offers.
pub const SUPPORTED_COUNTRIES: [&str; 32] = [
    "CA", "US", "AR", "BR", "AT", "BG", "CZ", "FI", "FR", "DE", "GR", "IE", "NL", "PL", "PT",
    "RO", "SE", "SK", "ES", "CH", "TR", "UA", "UK", "AU", "CN", "HK", "JP", "KR", "RU", "TW",
    "IL", "KZ",
];

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<h3[^>]*\bid\s*=\s*"([A-Za-z]{2})"[^>]*>(.*?)</h3>"#).unwrap()
});

static TABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<table\b.*?</table>").unwrap());

static ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<tr\b.*?</tr>").unwrap());

static NAME_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td[^>]*\browspan\b[^>]*>(.*?)</td>").unwrap());

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<a[^>]*\bhref\s*=\s*"([^"]+)""#).unwrap());

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// A named download server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    pub name: String,
    /// Base URL, the directory that contains `releases/`.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub name: String,
    /// Code used on the Gentoo mirror page (`UK`, not `GB`).
    pub code: String,
    /// Mirrors ordered by name.
    pub mirrors: Vec<Mirror>,
}

impl Country {
    pub fn mirror(&self, name: &str) -> Option<&Mirror> {
        self.mirrors.iter().find(|m| m.name == name)
    }

    pub fn mirror_names(&self) -> impl Iterator<Item = &str> {
        self.mirrors.iter().map(|m| m.name.as_str())
    }

    /// Picks one of the country's mirrors uniformly at random.
    ///
    /// This is an arbitrary choice, not a proximity or latency based one.
    pub fn arbitrary_mirror(&self) -> Option<&Mirror> {
        self.mirrors.choose(&mut rand::rng())
    }
}

/// (country name, mirror page code, [(mirror name, base url)])
type CountryRow = (&'static str, &'static str, &'static [(&'static str, &'static str)]);

const BUILTIN: &[CountryRow] = &[
    (
        "Argentina",
        "AR",
        &[("Zero (http)", "http://gentoo.zero.com.ar/gentoo/")],
    ),
    (
        "Australia",
        "AU",
        &[
            ("AARNet (http)", "http://mirror.aarnet.edu.au/pub/gentoo/"),
            ("Internode (http)", "http://mirror.internode.on.net/pub/gentoo/"),
        ],
    ),
    (
        "Austria",
        "AT",
        &[
            ("easyname (http)", "http://mirror.easyname.at/gentoo/"),
            ("Vienna University of Technology (http)", "http://gd.tuwien.ac.at/opsys/linux/gentoo/"),
        ],
    ),
    (
        "Brazil",
        "BR",
        &[("C3SL, Federal University of Parana (http)", "http://gentoo.c3sl.ufpr.br/")],
    ),
    (
        "Bulgaria",
        "BG",
        &[("Telepoint (http)", "http://mirrors.telepoint.bg/gentoo/")],
    ),
    (
        "Canada",
        "CA",
        &[("University of Waterloo (http)", "http://mirror.csclub.uwaterloo.ca/gentoo-distfiles/")],
    ),
    (
        "China",
        "CN",
        &[
            ("Tsinghua University (http)", "http://mirrors.tuna.tsinghua.edu.cn/gentoo/"),
            ("University of Science and Technology of China (http)", "http://mirrors.ustc.edu.cn/gentoo/"),
        ],
    ),
    (
        "Czech Republic",
        "CZ",
        &[
            ("Masaryk University Brno (http)", "http://ftp.fi.muni.cz/pub/linux/gentoo/"),
            ("web4u (http)", "http://gentoo.mirror.web4u.cz/"),
        ],
    ),
    (
        "Finland",
        "FI",
        &[("Tampere University of Technology (http)", "http://trumpetti.atm.tut.fi/gentoo/")],
    ),
    (
        "France",
        "FR",
        &[("OVH (http)", "http://gentoo.mirrors.ovh.net/gentoo-distfiles/")],
    ),
    (
        "Germany",
        "DE",
        &[
            ("FAU Erlangen-Nuernberg (http)", "http://ftp.fau.de/gentoo/"),
            ("Hochschule Esslingen (http)", "http://ftp-stud.hs-esslingen.de/pub/Mirrors/gentoo/"),
        ],
    ),
    (
        "Greece",
        "GR",
        &[
            ("National Technical University of Athens (http)", "http://ftp.ntua.gr/pub/linux/gentoo/"),
            ("University of Crete (http)", "http://ftp.cc.uoc.gr/mirrors/linux/gentoo/"),
        ],
    ),
    (
        "Hong Kong",
        "HK",
        &[("xTom (http)", "http://mirror.xtom.com.hk/gentoo/")],
    ),
    (
        "Ireland",
        "IE",
        &[("HEAnet (http)", "http://ftp.heanet.ie/pub/gentoo/")],
    ),
    (
        "Israel",
        "IL",
        &[("Israel Internet Association (http)", "http://mirror.isoc.org.il/pub/gentoo/")],
    ),
    (
        "Japan",
        "JP",
        &[("JAIST (http)", "http://ftp.jaist.ac.jp/pub/Linux/Gentoo/")],
    ),
    (
        "Kazakhstan",
        "KZ",
        &[("PS Internet Company (http)", "http://mirror.ps.kz/gentoo/pub/")],
    ),
    (
        "Korea",
        "KR",
        &[("KAIST (http)", "http://ftp.kaist.ac.kr/gentoo/")],
    ),
    (
        "Netherlands",
        "NL",
        &[
            ("LeaseWeb (http)", "http://mirror.leaseweb.com/gentoo/"),
            ("University of Twente (http)", "http://ftp.snt.utwente.nl/pub/os/linux/gentoo/"),
        ],
    ),
    (
        "Poland",
        "PL",
        &[
            ("Rzeszow University of Technology (http)", "http://gentoo.prz.rzeszow.pl/"),
            ("Vectranet (http)", "http://ftp.vectranet.pl/gentoo/"),
        ],
    ),
    (
        "Portugal",
        "PT",
        &[
            ("PTISP (http)", "http://mirrors.ptisp.pt/gentoo/"),
            ("University of Coimbra (http)", "http://ftp.dei.uc.pt/pub/linux/gentoo/"),
        ],
    ),
    (
        "Romania",
        "RO",
        &[("NXTHost (http)", "http://mirrors.nxthost.com/gentoo/")],
    ),
    (
        "Russia",
        "RU",
        &[("Yandex (http)", "http://mirror.yandex.ru/gentoo-distfiles/")],
    ),
    (
        "Slovakia",
        "SK",
        &[("Rainside (http)", "http://tux.rainside.sk/gentoo/")],
    ),
    (
        "Spain",
        "ES",
        &[("RedIRIS (http)", "http://ftp.rediris.es/mirror/gentoo/")],
    ),
    (
        "Sweden",
        "SE",
        &[("Lysator (http)", "http://ftp.lysator.liu.se/gentoo/")],
    ),
    (
        "Switzerland",
        "CH",
        &[("Init7 (http)", "http://mirror.init7.net/gentoo/")],
    ),
    (
        "Taiwan",
        "TW",
        &[("NCHC (http)", "http://ftp.twaren.net/Linux/Gentoo/")],
    ),
    (
        "Turkey",
        "TR",
        &[("Turkish Linux Users Association (http)", "http://ftp.linux.org.tr/gentoo/")],
    ),
    (
        "UK",
        "UK",
        &[("UK Mirror Service (http)", "http://www.mirrorservice.org/sites/distfiles.gentoo.org/")],
    ),
    (
        "Ukraine",
        "UA",
        &[("Volia (http)", "http://gentoo.volia.net/")],
    ),
    (
        "USA",
        "US",
        &[
            ("Georgia Tech (http)", "http://www.gtlib.gatech.edu/pub/gentoo/"),
            ("OSU Open Source Lab (http)", "http://gentoo.osuosl.org/"),
            ("Rackspace (http)", "http://mirror.rackspace.com/gentoo/"),
        ],
    ),
];

/// Text content of an HTML fragment with the few entities the mirror page uses decoded.
fn inner_text(html: &str) -> String {
    let text = TAG.replace_all(html, "");
    let text = text
        .replace("&ndash;", "\u{2013}")
        .replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Country name from a heading such as `CA &ndash; Canada`.
fn heading_country(code: &str, heading: &str) -> String {
    let text = inner_text(heading);
    let name = text
        .strip_prefix(code)
        .unwrap_or(&text)
        .trim_start_matches(|c: char| c.is_whitespace() || c == '\u{2013}' || c == '-');
    if name.is_empty() {
        code.to_string()
    } else {
        name.to_string()
    }
}

/// Extracts the HTTP mirrors of supported countries from the Gentoo mirror page.
///
/// Each country section is an `<h3 id="CC">` heading followed by a table whose
/// rows carry the mirror name in a `rowspan` cell and one link per protocol.
/// Only `http` links are kept, named `"<mirror> (http)"`.
pub fn parse_mirror_page(html: &str) -> Vec<Country> {
    let headings: Vec<_> = HEADING.captures_iter(html).collect();
    let mut countries = Vec::new();

    for (i, caps) in headings.iter().enumerate() {
        let code = caps[1].to_ascii_uppercase();
        if !SUPPORTED_COUNTRIES.contains(&code.as_str()) {
            continue;
        }
        let start = caps.get(0).map_or(0, |m| m.end());
        let end = headings
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(html.len(), |m| m.start());
        let Some(table) = TABLE.find(&html[start..end]) else {
            continue;
        };

        let mut mirrors = Vec::new();
        let mut mirror_name = String::new();
        for row in ROW.find_iter(table.as_str()) {
            if let Some(cell) = NAME_CELL.captures(row.as_str()) {
                mirror_name = inner_text(&cell[1]);
            }
            for link in LINK.captures_iter(row.as_str()) {
                let href = link[1].replace("&amp;", "&");
                let is_http = Url::parse(&href).is_ok_and(|url| url.scheme() == "http");
                if is_http && !mirror_name.is_empty() {
                    mirrors.push(Mirror {
                        name: format!("{mirror_name} (http)"),
                        url: href,
                    });
                }
            }
        }

        if !mirrors.is_empty() {
            countries.push(Country {
                name: heading_country(&code, &caps[2]),
                code,
                mirrors,
            });
        }
    }
    countries
}

/// Downloads and parses the Gentoo mirror page.
pub async fn fetch_mirror_page(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<Country>> {
    let failure = |reason: String| GensystemError::LookupFailure {
        url: url.to_string(),
        reason,
    };
    debug!(url, "fetching mirror page");
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| failure(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failure(format!("HTTP {}", response.status())));
    }
    let html = response.text().await.map_err(|e| failure(e.to_string()))?;

    let countries = parse_mirror_page(&html);
    if countries.is_empty() {
        return Err(failure("no mirrors found on the page".to_string()));
    }
    Ok(countries)
}

/// Lookup table of countries and their mirrors.
#[derive(Debug, Clone, Default)]
pub struct MirrorDirectory {
    countries: BTreeMap<String, Country>,
}

impl MirrorDirectory {
    /// The built-in Gentoo mirror table.
    pub fn builtin() -> Self {
        Self::from_countries(BUILTIN.iter().map(|(name, code, mirrors)| Country {
            name: name.to_string(),
            code: code.to_string(),
            mirrors: mirrors
                .iter()
                .map(|(name, url)| Mirror {
                    name: name.to_string(),
                    url: url.to_string(),
                })
                .collect(),
        }))
    }

    pub fn from_countries(countries: impl IntoIterator<Item = Country>) -> Self {
        let mut directory = Self::default();
        for country in countries {
            directory.insert(country);
        }
        directory
    }

    /// Adds a country, merging its mirrors into an existing entry of the same name.
    pub fn insert(&mut self, country: Country) {
        let entry = self
            .countries
            .entry(country.name.clone())
            .or_insert_with(|| Country {
                name: country.name.clone(),
                code: country.code.clone(),
                mirrors: Vec::new(),
            });
        for mirror in country.mirrors {
            match entry.mirrors.iter_mut().find(|m| m.name == mirror.name) {
                Some(existing) => existing.url = mirror.url,
                None => entry.mirrors.push(mirror),
            }
        }
        entry.mirrors.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Merges countries read from the mirror page.
    ///
    /// A country whose code is already known is merged under the existing
    /// name, so a page heading reading "United Kingdom" lands in `UK`.
    pub fn merge(&mut self, countries: Vec<Country>) {
        for mut country in countries {
            if let Some(known) = self.country_by_code(&country.code) {
                country.name = known.name.clone();
            }
            self.insert(country);
        }
    }

    /// Refreshes the directory from the mirror page at `url`.
    ///
    /// Returns the number of countries read from the page.
    pub async fn refresh(
        &mut self,
        client: &reqwest::Client,
        url: &str,
        timeout: Duration,
    ) -> Result<usize> {
        let countries = fetch_mirror_page(client, url, timeout).await?;
        let count = countries.len();
        self.merge(countries);
        info!(url, countries = count, "mirror directory refreshed");
        Ok(count)
    }

    /// Merges mirrors declared in the configuration file.
    pub fn with_extra(mut self, extra: &[ExtraMirror]) -> Self {
        for mirror in extra {
            let code = mirror
                .code
                .clone()
                .or_else(|| self.country(&mirror.country).map(|c| c.code.clone()))
                .unwrap_or_default();
            self.insert(Country {
                name: mirror.country.clone(),
                code,
                mirrors: vec![Mirror {
                    name: mirror.name.clone(),
                    url: mirror.url.clone(),
                }],
            });
        }
        self
    }

    pub fn country(&self, name: &str) -> Option<&Country> {
        self.countries.get(name)
    }

    /// Finds a country by its mirror page code, ignoring case.
    pub fn country_by_code(&self, code: &str) -> Option<&Country> {
        self.countries
            .values()
            .find(|c| !c.code.is_empty() && c.code.eq_ignore_ascii_case(code))
    }

    /// Country names in sorted order.
    pub fn country_names(&self) -> impl Iterator<Item = &str> {
        self.countries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}
