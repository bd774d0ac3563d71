use proc_macro2 as pm2;
use syn::ext::IdentExt;

#[derive(Debug)]
pub enum FilterItem {
    Table(syn::LitStr),
    Model(syn::LitStr),
    Restrict(syn::LitStr),
    Operators(Vec<syn::LitStr>),
    Rename(syn::LitStr),
    Op(Vec<syn::LitStr>),
    Relation,
    Excluded,
}

fn parse_list(input: syn::parse::ParseStream<'_>) -> syn::Result<Vec<syn::LitStr>> {
    let content;
    let _: syn::token::Paren = syn::parenthesized!(content in input);
    let punc = syn::punctuated::Punctuated::<syn::LitStr, syn::Token![,]>::parse_terminated(&content)?;
    Ok(punc.into_iter().collect())
}

fn parse_value(input: syn::parse::ParseStream<'_>) -> syn::Result<syn::LitStr> {
    let _: syn::Token![=] = input.parse()?;
    input.parse()
}

impl syn::parse::Parse for FilterItem {
    fn parse(input: syn::parse::ParseStream<'_>) -> syn::Result<Self> {
        let attr = input.call(syn::Ident::parse_any)?;
        match attr.to_string().as_str() {
            "table" => Ok(FilterItem::Table(parse_value(input)?)),
            "model" => Ok(FilterItem::Model(parse_value(input)?)),
            // restrict = "field:$eq,$in"
            "restrict" => Ok(FilterItem::Restrict(parse_value(input)?)),
            // operators("$eq", "$in", "$or")
            "operators" => Ok(FilterItem::Operators(parse_list(input)?)),
            "rename" => Ok(FilterItem::Rename(parse_value(input)?)),
            "op" => Ok(FilterItem::Op(parse_list(input)?)),
            "relation" => Ok(FilterItem::Relation),
            "exclude" => Ok(FilterItem::Excluded),
            _ => Err(syn::Error::new_spanned(attr, "unsupported filter attribute")),
        }
    }
}

fn not_allowed(item: &str, place: &str, span: pm2::Span) -> syn::Error {
    syn::Error::new(span, format!("`{}` cannot be used on a {}", item, place))
}

/// A restriction parsed at compile time from `"field:op1,op2"`.
#[derive(Debug)]
pub struct Restrict {
    pub field: String,
    pub operators: Vec<String>,
    pub span: pm2::Span,
}

impl Restrict {
    fn parse(lit: &syn::LitStr) -> syn::Result<Self> {
        let value = lit.value();
        let (field, operators) = value.split_once(':').ok_or_else(|| {
            syn::Error::new(lit.span(), "expected \"field:op1,op2\"")
        })?;
        let field = field.trim();
        if field.is_empty() {
            return Err(syn::Error::new(lit.span(), "restriction names no field"));
        }
        let operators: Vec<String> = operators.split(',').map(|op| op.trim().to_string()).collect();
        if operators.iter().any(String::is_empty) {
            return Err(syn::Error::new(
                lit.span(),
                "restriction contains an empty operator",
            ));
        }
        Ok(Restrict {
            field: field.to_string(),
            operators,
            span: lit.span(),
        })
    }
}

/// Attributes placed on the struct itself.
#[derive(Debug, Default)]
pub struct ContainerMeta {
    pub table: Option<syn::LitStr>,
    pub model: Option<syn::LitStr>,
    pub restrictions: Vec<Restrict>,
    pub operators: Option<Vec<syn::LitStr>>,
}

impl syn::parse::Parse for ContainerMeta {
    fn parse(input: syn::parse::ParseStream<'_>) -> syn::Result<Self> {
        let mut meta = ContainerMeta::default();
        let punc =
            syn::punctuated::Punctuated::<FilterItem, syn::Token![,]>::parse_terminated(input)?;
        for item in punc {
            match item {
                FilterItem::Table(t) => meta.table = Some(t),
                FilterItem::Model(m) => meta.model = Some(m),
                FilterItem::Restrict(r) => meta.restrictions.push(Restrict::parse(&r)?),
                FilterItem::Operators(ops) => {
                    if ops.is_empty() {
                        return Err(syn::Error::new(
                            input.span(),
                            "operators(...) needs at least one operator",
                        ));
                    }
                    meta.operators = Some(ops)
                }
                FilterItem::Rename(l) => return Err(not_allowed("rename", "struct", l.span())),
                FilterItem::Op(_) => return Err(not_allowed("op", "struct", input.span())),
                FilterItem::Relation => {
                    return Err(not_allowed("relation", "struct", input.span()))
                }
                FilterItem::Excluded => {
                    return Err(not_allowed("exclude", "struct", input.span()))
                }
            }
        }
        Ok(meta)
    }
}

#[derive(Debug)]
pub enum FilterKind {
    Field { operators: Vec<syn::LitStr> },
    Relation,
    Excluded,
}

/// Attributes placed on a single field.
#[derive(Debug)]
pub struct FieldMeta {
    pub name: Option<syn::LitStr>,
    pub kind: FilterKind,
}

impl syn::parse::Parse for FieldMeta {
    fn parse(input: syn::parse::ParseStream<'_>) -> syn::Result<Self> {
        let mut name = None;
        let mut operators = Vec::new();
        let mut relation = false;
        let mut excluded = false;
        let punc =
            syn::punctuated::Punctuated::<FilterItem, syn::Token![,]>::parse_terminated(input)?;

        for item in punc {
            match item {
                FilterItem::Rename(new_name) => name = Some(new_name),
                FilterItem::Op(ops) => operators.extend(ops),
                FilterItem::Relation => relation = true,
                FilterItem::Excluded => excluded = true,
                FilterItem::Table(l) => return Err(not_allowed("table", "field", l.span())),
                FilterItem::Model(l) => return Err(not_allowed("model", "field", l.span())),
                FilterItem::Restrict(l) => {
                    return Err(not_allowed("restrict", "field", l.span()))
                }
                FilterItem::Operators(_) => {
                    return Err(not_allowed("operators", "field", input.span()))
                }
            }
        }

        let kind = if excluded {
            FilterKind::Excluded
        } else if relation {
            if !operators.is_empty() {
                return Err(syn::Error::new(
                    input.span(),
                    "a relation cannot be restricted to operators",
                ));
            }
            FilterKind::Relation
        } else {
            FilterKind::Field { operators }
        };

        Ok(FieldMeta { name, kind })
    }
}

impl Default for FieldMeta {
    fn default() -> Self {
        FieldMeta {
            name: None,
            kind: FilterKind::Field {
                operators: Vec::new(),
            },
        }
    }
}

impl FieldMeta {
    /// Fold a later `#[filter(...)]` attribute on the same field into
    /// this one.
    pub fn merge(&mut self, other: FieldMeta) {
        if other.name.is_some() {
            self.name = other.name;
        }
        self.kind = match (std::mem::replace(&mut self.kind, FilterKind::Excluded), other.kind) {
            (FilterKind::Excluded, _) | (_, FilterKind::Excluded) => FilterKind::Excluded,
            (FilterKind::Relation, _) | (_, FilterKind::Relation) => FilterKind::Relation,
            (FilterKind::Field { mut operators }, FilterKind::Field { operators: more }) => {
                operators.extend(more);
                FilterKind::Field { operators }
            }
        };
    }
}
