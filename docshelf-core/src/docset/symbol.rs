//! Symbol categories and symbol table records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of symbol categories
///
/// Declaration order is the category order used when several entries share
/// a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SymbolCategory {
    Class,
    Method,
    Function,
    Constant,
    Constructor,
    Enumeration,
    Event,
    Field,
    Guide,
    Namespace,
    Macro,
    Operator,
    Property,
    Protocol,
    Structure,
    Type,
    Variable,
    Attribute,
    Binding,
}

impl SymbolCategory {
    pub const ALL: [SymbolCategory; 19] = [
        SymbolCategory::Class,
        SymbolCategory::Method,
        SymbolCategory::Function,
        SymbolCategory::Constant,
        SymbolCategory::Constructor,
        SymbolCategory::Enumeration,
        SymbolCategory::Event,
        SymbolCategory::Field,
        SymbolCategory::Guide,
        SymbolCategory::Namespace,
        SymbolCategory::Macro,
        SymbolCategory::Operator,
        SymbolCategory::Property,
        SymbolCategory::Protocol,
        SymbolCategory::Structure,
        SymbolCategory::Type,
        SymbolCategory::Variable,
        SymbolCategory::Attribute,
        SymbolCategory::Binding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolCategory::Class => "Class",
            SymbolCategory::Method => "Method",
            SymbolCategory::Function => "Function",
            SymbolCategory::Constant => "Constant",
            SymbolCategory::Constructor => "Constructor",
            SymbolCategory::Enumeration => "Enumeration",
            SymbolCategory::Event => "Event",
            SymbolCategory::Field => "Field",
            SymbolCategory::Guide => "Guide",
            SymbolCategory::Namespace => "Namespace",
            SymbolCategory::Macro => "Macro",
            SymbolCategory::Operator => "Operator",
            SymbolCategory::Property => "Property",
            SymbolCategory::Protocol => "Protocol",
            SymbolCategory::Structure => "Structure",
            SymbolCategory::Type => "Type",
            SymbolCategory::Variable => "Variable",
            SymbolCategory::Attribute => "Attribute",
            SymbolCategory::Binding => "Binding",
        }
    }

    /// Map a symbol table type name to a category
    ///
    /// Accepts the canonical names as well as the abbreviations and
    /// doxygen-style section titles found in Dash docsets.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(category) = Self::ALL.iter().find(|c| c.as_str() == raw) {
            return Some(*category);
        }

        let category = match raw {
            "Package Attributes"
            | "Private Attributes"
            | "Protected Attributes"
            | "Public Attributes"
            | "Static Package Attributes"
            | "Static Private Attributes"
            | "Static Protected Attributes"
            | "Static Public Attributes"
            | "XML Attributes" => SymbolCategory::Attribute,
            "binding" => SymbolCategory::Binding,
            "cl" | "specialization" | "tmplt" => SymbolCategory::Class,
            "data" | "econst" | "enumdata" | "enumelt" | "clconst" | "structdata"
            | "writerid" | "Notifications" => SymbolCategory::Constant,
            "structctr" | "Public Constructors" => SymbolCategory::Constructor,
            "enum" | "Enum" | "Enumerations" => SymbolCategory::Enumeration,
            "event" | "Public Events" | "Inherited Events" | "Private Events" => {
                SymbolCategory::Event
            }
            "Data Fields" => SymbolCategory::Field,
            "dcop"
            | "func"
            | "ffunc"
            | "signal"
            | "slot"
            | "grammar"
            | "Function Prototypes"
            | "Functions/Subroutines"
            | "Members"
            | "Package Functions"
            | "Private Member Functions"
            | "Private Slots"
            | "Protected Member Functions"
            | "Protected Slots"
            | "Public Member Functions"
            | "Public Slots"
            | "Signals"
            | "Static Package Functions"
            | "Static Private Member Functions"
            | "Static Protected Member Functions"
            | "Static Public Member Functions" => SymbolCategory::Function,
            "doc" => SymbolCategory::Guide,
            "ns" => SymbolCategory::Namespace,
            "macro" => SymbolCategory::Macro,
            "clm"
            | "enumcm"
            | "enumctr"
            | "enumm"
            | "intfctr"
            | "intfcm"
            | "intfm"
            | "intfsub"
            | "instsub"
            | "instctr"
            | "instm"
            | "structcm"
            | "structm"
            | "structsub"
            | "Class Methods"
            | "Inherited Methods"
            | "Instance Methods"
            | "Private Methods"
            | "Protected Methods"
            | "Public Methods" => SymbolCategory::Method,
            "intfopfunc" | "opfunc" => SymbolCategory::Operator,
            "enump"
            | "intfdata"
            | "intfp"
            | "instp"
            | "structp"
            | "Inherited Properties"
            | "Private Properties"
            | "Protected Properties"
            | "Public Properties" => SymbolCategory::Property,
            "intf" => SymbolCategory::Protocol,
            "_Struct" | "_Structs" | "struct" | "Control Structure" | "Data Structures"
            | "Struct" => SymbolCategory::Structure,
            "tag" | "tdef" | "Data Types" | "Package Types" | "Private Types"
            | "Protected Types" | "Public Types" | "Typedefs" => SymbolCategory::Type,
            "var" => SymbolCategory::Variable,
            _ => return None,
        };

        Some(category)
    }
}

impl fmt::Display for SymbolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown symbol category: {s}"))
    }
}

/// One symbol of a docset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    pub category: SymbolCategory,
    /// Location inside the content store, `path[#fragment]`
    pub location: String,
}

impl SymbolEntry {
    pub fn new(name: impl Into<String>, category: SymbolCategory, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category,
            location: location.into(),
        }
    }

    /// Page path without the fragment
    pub fn page(&self) -> &str {
        self.location
            .split_once('#')
            .map(|(page, _)| page)
            .unwrap_or(&self.location)
    }

    pub fn fragment(&self) -> Option<&str> {
        self.location.split_once('#').map(|(_, fragment)| fragment)
    }
}

/// A raw record of a bundle's `symbols.json`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawSymbol {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    #[serde(default)]
    pub fragment: Option<String>,
}

impl RawSymbol {
    /// Dash entries embed markers like `<dash_entry_name=...>` in paths
    pub fn location(&self) -> String {
        let path = strip_dash_markers(&self.path);
        match self.fragment.as_deref().map(strip_dash_markers) {
            Some(fragment) if !fragment.is_empty() => format!("{path}#{fragment}"),
            _ => path,
        }
    }
}

fn strip_dash_markers(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("<dash_entry_") {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_and_aliases() {
        assert_eq!(SymbolCategory::parse("Class"), Some(SymbolCategory::Class));
        assert_eq!(SymbolCategory::parse("cl"), Some(SymbolCategory::Class));
        assert_eq!(SymbolCategory::parse("clm"), Some(SymbolCategory::Method));
        assert_eq!(
            SymbolCategory::parse("Public Member Functions"),
            Some(SymbolCategory::Function)
        );
        assert_eq!(SymbolCategory::parse("tdef"), Some(SymbolCategory::Type));
        assert_eq!(SymbolCategory::parse("binding"), Some(SymbolCategory::Binding));
        assert_eq!(SymbolCategory::parse("Sample"), None);
    }

    #[test]
    fn test_every_category_round_trips_through_its_name() {
        for category in SymbolCategory::ALL {
            assert_eq!(category.as_str().parse::<SymbolCategory>(), Ok(category));
        }
    }

    #[test]
    fn test_location_with_fragment_and_dash_markers() {
        let raw = RawSymbol {
            name: "push".to_string(),
            kind: "Method".to_string(),
            path: "<dash_entry_name=push>std/vec/struct.Vec.html".to_string(),
            fragment: Some("method.push".to_string()),
        };
        assert_eq!(raw.location(), "std/vec/struct.Vec.html#method.push");

        let entry = SymbolEntry::new("push", SymbolCategory::Method, raw.location());
        assert_eq!(entry.page(), "std/vec/struct.Vec.html");
        assert_eq!(entry.fragment(), Some("method.push"));
    }
}
