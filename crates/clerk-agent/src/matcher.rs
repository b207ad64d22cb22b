//! Keyword matching of form fields against the user profile.

use clerk_store::{Profile, normalize};
use serde_json::Value;

use crate::page::Field;

type Extract = fn(&Profile) -> Option<String>;

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

fn first_name(p: &Profile) -> Option<String> {
    non_empty(p.personal.first_name.as_ref()).or_else(|| {
        p.personal
            .full_name
            .as_deref()
            .and_then(|full| full.split_whitespace().next())
            .map(str::to_string)
    })
}

fn last_name(p: &Profile) -> Option<String> {
    non_empty(p.personal.last_name.as_ref()).or_else(|| {
        let full = p.personal.full_name.as_deref()?;
        let mut words = full.split_whitespace();
        words.next()?;
        words.last().map(str::to_string)
    })
}

fn full_name(p: &Profile) -> Option<String> {
    non_empty(p.personal.full_name.as_ref()).or_else(|| {
        match (non_empty(p.personal.first_name.as_ref()), non_empty(p.personal.last_name.as_ref())) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (first, last) => first.or(last),
        }
    })
}

macro_rules! address {
    ($field:ident) => {
        |p: &Profile| non_empty(p.personal.address.as_ref()?.$field.as_ref())
    };
}

/// Ordered rules; the first rule with a matching keyword wins.
const RULES: &[(&[&str], Extract)] = &[
    (&["first name", "firstname", "given name", "fname"], first_name),
    (&["last name", "lastname", "surname", "family name", "lname"], last_name),
    (&["email", "e mail"], |p: &Profile| non_empty(p.personal.email.as_ref())),
    (&["phone", "telephone", "mobile", "tel", "cell"], |p: &Profile| {
        non_empty(p.personal.phone.as_ref())
    }),
    (&["date of birth", "birth date", "birthdate", "dob", "birthday"], |p: &Profile| {
        non_empty(p.personal.date_of_birth.as_ref())
    }),
    (&["gender", "sex"], |p: &Profile| non_empty(p.personal.gender.as_ref())),
    (&["nationality", "citizenship"], |p: &Profile| non_empty(p.personal.nationality.as_ref())),
    (&["marital"], |p: &Profile| non_empty(p.personal.marital_status.as_ref())),
    (&["zip", "zip code", "zipcode", "postal", "postal code", "postcode"], address!(zip_code)),
    (&["city", "town"], address!(city)),
    (&["state", "province", "region"], address!(state)),
    (&["country"], address!(country)),
    (&["street", "address", "address line 1", "address1"], address!(street)),
    (&["company", "employer", "organization", "organisation"], |p: &Profile| {
        non_empty(p.work_experience.first()?.company.as_ref())
    }),
    (&["job title", "title", "position", "role"], |p: &Profile| {
        non_empty(p.work_experience.first()?.title.as_ref())
    }),
    (&["school", "university", "college", "institution"], |p: &Profile| {
        non_empty(p.education.first()?.institution.as_ref())
    }),
    (&["degree"], |p: &Profile| non_empty(p.education.first()?.degree.as_ref())),
    (&["major", "field of study"], |p: &Profile| {
        non_empty(p.education.first()?.field_of_study.as_ref())
    }),
    (&["gpa"], |p: &Profile| non_empty(p.education.first()?.gpa.as_ref())),
    (&["skills"], |p: &Profile| (!p.skills.is_empty()).then(|| p.skills.join(", "))),
    (&["full name", "name", "your name"], full_name),
];

fn words(text: &str) -> String {
    format!(" {} ", normalize(&text.replace(['_', '-'], " ")))
}

/// Find a profile value for `field`, if the profile knows one.
#[must_use]
pub fn profile_value(profile: &Profile, field: &Field) -> Option<String> {
    match field.kind.as_str() {
        "email" => return non_empty(profile.personal.email.as_ref()),
        "tel" => return non_empty(profile.personal.phone.as_ref()),
        _ => {}
    }

    let haystack = words(&field.haystack());
    for (keywords, extract) in RULES {
        if keywords.iter().any(|kw| haystack.contains(&format!(" {kw} "))) {
            if let Some(value) = extract(profile) {
                return Some(value);
            }
        }
    }

    // Free-form extras keyed like questions.
    let question = normalize(field.question());
    profile
        .additional_data
        .iter()
        .find(|(key, _)| normalize(key) == question)
        .and_then(|(_, value)| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
}
