use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(EmployeeId);
id_newtype!(VacationId);
id_newtype!(RecordId);

/// Year-less calendar key (`MM-DD`). Vacations recur on it every year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    /// Feb 29 is accepted; it simply never matches in non-leap years.
    pub fn new(month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(2000, month, day).map(|_| Self { month, day })
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for MonthDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (month, day) = s
            .split_once('-')
            .ok_or_else(|| format!("expected MM-DD, got '{s}'"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in '{s}'"))?;
        let day: u32 = day.parse().map_err(|_| format!("invalid day in '{s}'"))?;
        Self::new(month, day).ok_or_else(|| format!("no such calendar day '{s}'"))
    }
}

impl TryFrom<String> for MonthDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthDay> for String {
    fn from(value: MonthDay) -> Self {
        value.to_string()
    }
}

/// Full calendar date (`YYYY-MM-DD`). Break records are keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarDate(pub NaiveDate);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn month_day(&self) -> MonthDay {
        MonthDay {
            month: self.0.month(),
            day: self.0.day(),
        }
    }

    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }

    /// `2024-05-01 (Wednesday)`
    pub fn display_label(&self) -> String {
        format!("{} ({})", self, weekday_name(self.weekday()))
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for CalendarDate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|e| format!("invalid date '{s}': {e}"))
    }
}

/// Wall-clock time with minute precision (`HH:MM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    /// Drops seconds and below.
    pub fn truncate(time: NaiveTime) -> Self {
        Self(NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time))
    }

    /// Signed minutes from `self` to `later` on the same day. Negative when
    /// `later` is earlier on the clock, e.g. across midnight.
    pub fn minutes_until(&self, later: ClockTime) -> i64 {
        (later.0 - self.0).num_minutes()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for ClockTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(Self::truncate)
            .map_err(|e| format!("invalid time '{s}': {e}"))
    }
}

impl TryFrom<String> for ClockTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Accepts English names and abbreviations (any case) and the Korean
/// forms used by older snapshots (`일요일`, `일`).
pub fn parse_weekday(token: &str) -> Option<Weekday> {
    let token = token.trim();
    if let Ok(day) = token.parse::<Weekday>() {
        return Some(day);
    }
    let short = token.strip_suffix("요일").unwrap_or(token);
    match short {
        "월" => Some(Weekday::Mon),
        "화" => Some(Weekday::Tue),
        "수" => Some(Weekday::Wed),
        "목" => Some(Weekday::Thu),
        "금" => Some(Weekday::Fri),
        "토" => Some(Weekday::Sat),
        "일" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Weekly off-days, kept in Monday-first order without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekdaySet(Vec<Weekday>);

impl WeekdaySet {
    pub fn new(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut set = Self::default();
        for day in days {
            set.insert(day);
        }
        set
    }

    pub fn insert(&mut self, day: Weekday) {
        if self.0.contains(&day) {
            return;
        }
        self.0.push(day);
        self.0.sort_by_key(|d| d.num_days_from_monday());
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0.contains(&day)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(weekday_name).collect();
        write!(f, "{}", names.join(", "))
    }
}

impl FromStr for WeekdaySet {
    type Err = String;

    /// Comma and/or whitespace separated day names. Empty input is an empty set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = Self::default();
        for token in s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let day = parse_weekday(token).ok_or_else(|| format!("unknown weekday '{token}'"))?;
            set.insert(day);
        }
        Ok(set)
    }
}

impl WeekdaySet {
    /// Reads free-form off-day text as older snapshots stored it. Any
    /// run of letters that names a day counts, as does a day name buried
    /// inside a longer word (`일요일만`). Anything else is ignored.
    pub fn from_legacy_text(text: &str) -> Self {
        let mut set = Self::default();
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            if let Some(day) = parse_weekday(token) {
                set.insert(day);
                continue;
            }
            let lower = token.to_lowercase();
            for day in ALL_WEEKDAYS {
                if lower.contains(&korean_weekday_name(day))
                    || lower.contains(&weekday_name(day).to_lowercase())
                {
                    set.insert(day);
                }
            }
        }
        set
    }
}

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn korean_weekday_name(day: Weekday) -> String {
    let short = match day {
        Weekday::Mon => "월",
        Weekday::Tue => "화",
        Weekday::Wed => "수",
        Weekday::Thu => "목",
        Weekday::Fri => "금",
        Weekday::Sat => "토",
        Weekday::Sun => "일",
    };
    format!("{short}요일")
}

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(weekday_name))
    }
}

impl<'de> Deserialize<'de> for WeekdaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Text(String),
            Missing(()),
        }

        match Raw::deserialize(deserializer)? {
            Raw::List(names) => Ok(Self::new(
                names.iter().flat_map(|name| Self::from_legacy_text(name).0),
            )),
            Raw::Text(text) => Ok(Self::from_legacy_text(&text)),
            Raw::Missing(()) => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub off_days: WeekdaySet,
}

impl Employee {
    pub fn is_off_on(&self, date: CalendarDate) -> bool {
        self.off_days.contains(date.weekday())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub name: String,
    /// Stored for compatibility; the roster does not consult it.
    #[serde(default)]
    pub off_days: WeekdaySet,
}

impl Team {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            off_days: WeekdaySet::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vacation {
    pub id: VacationId,
    pub employee_id: EmployeeId,
    pub date: MonthDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakRecord {
    pub id: RecordId,
    pub employee_id: EmployeeId,
    pub date: CalendarDate,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub break_down: Option<ClockTime>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub break_up: Option<ClockTime>,
}

impl BreakRecord {
    pub fn is_complete(&self) -> bool {
        self.break_down.is_some() && self.break_up.is_some()
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.break_down, self.break_up) {
            (Some(down), Some(up)) => Some(down.minutes_until(up)),
            _ => None,
        }
    }
}

// Older snapshots store an unset time as "".
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<ClockTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(de::Error::custom),
    }
}
