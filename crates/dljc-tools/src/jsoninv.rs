//! Daikon `PrintInvariants --wrap_xml` output to a per-method JSON summary.

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

const PPT_SEPARATOR: &str = ":::";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantReport {
    pub invariants: Vec<MethodInvariants>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInvariants {
    pub cls: String,
    pub method: Option<String>,
    pub params: Option<Vec<String>>,
    pub preconds: Vec<Invariant>,
    pub postconds: Vec<Invariant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Invariant {
    Comparison {
        left: String,
        op: String,
        right: String,
    },
    Other {
        inv: String,
    },
}

impl Invariant {
    fn parse(text: &str) -> Self {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^(.*) ([=!<>]+|one of) (.*)$").expect("valid regex")
        });
        match re.captures(text) {
            Some(caps) => Invariant::Comparison {
                left: caps[1].to_string(),
                op: caps[2].to_string(),
                right: caps[3].to_string(),
            },
            None => Invariant::Other {
                inv: text.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Point {
    Enter,
    Exit,
}

struct ProgramPoint {
    class: String,
    method: Option<String>,
    params: Option<Vec<String>>,
    point: Point,
}

/// Parse a program point name such as
/// `com.example.Stack.push(java.lang.Object):::ENTER`.
///
/// Only the combined `ENTER` and `EXIT` points are of interest; numbered exits
/// and object/class points yield `None`.
fn parse_ppt_name(name: &str) -> Option<ProgramPoint> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(.*)\.([^(.]+)\.?\((.*)\)").expect("valid regex")
    });

    let (signature, point) = name.trim().split_once(PPT_SEPARATOR)?;
    let point = match point {
        "ENTER" => Point::Enter,
        "EXIT" => Point::Exit,
        _ => return None,
    };

    if !signature.contains('(') {
        return Some(ProgramPoint {
            class: signature.to_string(),
            method: None,
            params: None,
            point,
        });
    }

    let caps = re.captures(signature)?;
    let params = match &caps[3] {
        "" => Vec::new(),
        params => params.split(", ").map(str::to_string).collect(),
    };
    Some(ProgramPoint {
        class: caps[1].to_string(),
        method: Some(caps[2].to_string()),
        params: Some(params),
        point,
    })
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
        .and_then(|n| n.text())
}

/// Convert `invariants.xml` text into the grouped report.
pub fn invariants_from_xml(xml: &str) -> Result<InvariantReport, roxmltree::Error> {
    let doc = roxmltree::Document::parse(xml)?;
    let mut methods: IndexMap<(String, Option<String>, Option<Vec<String>>), MethodInvariants> =
        IndexMap::new();

    for ppt in doc.root_element().children().filter(|n| n.is_element()) {
        let Some(point) = child_text(ppt, "PPTNAME").and_then(parse_ppt_name) else {
            continue;
        };

        let key = (
            point.class.clone(),
            point.method.clone(),
            point.params.clone(),
        );
        let method = methods.entry(key).or_insert_with(|| MethodInvariants {
            cls: point.class,
            method: point.method,
            params: point.params,
            preconds: Vec::new(),
            postconds: Vec::new(),
        });

        for info in ppt
            .descendants()
            .filter(|n| n.is_element() && n.has_tag_name("INVINFO"))
        {
            let Some(text) = child_text(info, "INV") else {
                continue;
            };
            let invariant = Invariant::parse(text.trim());
            if child_text(info, "PARENT").map(str::trim) == Some("ENTER") {
                method.preconds.push(invariant);
            } else {
                method.postconds.push(invariant);
            }
        }
    }

    Ok(InvariantReport {
        invariants: methods.into_values().collect(),
    })
}
