//! Proc macros for Dungeon Master tool generation.
//!
//! Provides `#[derive(Tool)]` to generate OpenAI-style function tool
//! definitions and argument parsing from struct definitions.
//!
//! # Example
//!
//! ```ignore
//! /// Roll dice for checks, attacks or damage
//! #[derive(Tool, Deserialize)]
//! #[tool(name = "roll_dice")]
//! struct RollDice {
//!     /// Number of dice to roll
//!     #[tool(min = 1, max = 20)]
//!     count: u32,
//!     /// Sides per die
//!     #[tool(choices = "4,6,8,10,12,20,100")]
//!     sides: u32,
//!     /// Flat modifier added to the total
//!     #[tool(optional)]
//!     modifier: i32,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Attribute, DeriveInput, Expr, Field, Lit, Meta, Token, Type};

/// Derive macro for generating function tool definitions.
///
/// # Attributes
///
/// - `#[tool(name = "...")]` - Override the tool name (defaults to snake_case struct name)
/// - `#[tool(optional)]` on fields - Mark field as not required in the schema
/// - `#[tool(rename = "...")]` on fields - Override field name in schema
/// - `#[tool(choices = "a,b,c")]` on fields - Restrict the value to a fixed set
/// - `#[tool(min = N, max = M)]` on integer fields - Inclusive bounds
///
/// Several options can share one attribute: `#[tool(optional, min = 0)]`.
#[proc_macro_derive(Tool, attributes(tool))]
pub fn derive_tool(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_tool(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_tool(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let tool_name = get_tool_name(&input)?;
    let description = get_doc_comment(&input.attrs);

    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            syn::Fields::Unit => Vec::new(),
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Tool derive only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(&input, "Tool derive only supports structs")),
    };

    let mut property_tokens = Vec::new();
    let mut required_fields = Vec::new();

    for field in fields {
        let options = FieldOptions::parse(field)?;
        let field_name_str = options.rename.clone().unwrap_or_else(|| {
            field
                .ident
                .as_ref()
                .map(|i| i.to_string())
                .unwrap_or_default()
        });
        let field_desc = get_doc_comment(&field.attrs);
        let field_type = &field.ty;

        let type_schema = type_to_schema(field_type)?;

        let desc_token = if field_desc.is_empty() {
            quote! {}
        } else {
            quote! { property["description"] = serde_json::json!(#field_desc); }
        };

        let choices_token = match &options.choices {
            Some(choices) => {
                let values = choice_values(choices, is_integer_type(field_type));
                quote! { property["enum"] = serde_json::json!([#(#values),*]); }
            }
            None => quote! {},
        };

        let min_token = match options.min {
            Some(min) => quote! { property["minimum"] = serde_json::json!(#min); },
            None => quote! {},
        };
        let max_token = match options.max {
            Some(max) => quote! { property["maximum"] = serde_json::json!(#max); },
            None => quote! {},
        };

        property_tokens.push(quote! {
            {
                let mut property = #type_schema;
                #desc_token
                #choices_token
                #min_token
                #max_token
                properties.insert(#field_name_str.to_string(), property);
            }
        });

        if !options.optional && !is_option_type(field_type) {
            required_fields.push(field_name_str);
        }
    }

    let required_array: Vec<_> = required_fields.iter().map(|s| quote! { #s }).collect();

    Ok(quote! {
        impl #struct_name {
            /// Get the tool name.
            pub fn tool_name() -> &'static str {
                #tool_name
            }

            /// Get the tool description.
            pub fn tool_description() -> &'static str {
                #description
            }

            /// Generate the JSON schema for this tool's arguments.
            pub fn parameters_schema() -> serde_json::Value {
                let mut properties = serde_json::Map::new();
                #(#property_tokens)*

                let required: Vec<&str> = vec![#(#required_array),*];

                serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": required
                })
            }

            /// Create a function tool definition for the chat API.
            pub fn as_tool() -> llm::Tool {
                llm::Tool {
                    name: Self::tool_name().to_string(),
                    description: Self::tool_description().to_string(),
                    parameters: Self::parameters_schema(),
                }
            }

            /// Parse model-supplied arguments into this tool's input.
            pub fn from_arguments(arguments: &serde_json::Value) -> Result<Self, serde_json::Error>
            where
                Self: serde::de::DeserializeOwned,
            {
                serde_json::from_value(arguments.clone())
            }
        }
    })
}

/// Options collected from every `#[tool(...)]` attribute on a field.
#[derive(Default)]
struct FieldOptions {
    rename: Option<String>,
    optional: bool,
    choices: Option<String>,
    min: Option<i64>,
    max: Option<i64>,
}

impl FieldOptions {
    fn parse(field: &Field) -> syn::Result<Self> {
        let mut options = Self::default();
        for meta in tool_metas(&field.attrs)? {
            match &meta {
                Meta::Path(path) if path.is_ident("optional") => options.optional = true,
                Meta::NameValue(nv) if nv.path.is_ident("rename") => {
                    options.rename = Some(lit_str(&nv.value)?);
                }
                Meta::NameValue(nv) if nv.path.is_ident("choices") => {
                    options.choices = Some(lit_str(&nv.value)?);
                }
                Meta::NameValue(nv) if nv.path.is_ident("min") => {
                    options.min = Some(lit_int(&nv.value)?);
                }
                Meta::NameValue(nv) if nv.path.is_ident("max") => {
                    options.max = Some(lit_int(&nv.value)?);
                }
                other => {
                    return Err(syn::Error::new_spanned(other, "unknown tool field option"));
                }
            }
        }
        Ok(options)
    }
}

fn tool_metas(attrs: &[Attribute]) -> syn::Result<Vec<Meta>> {
    let mut metas = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("tool") {
            let parsed = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
            metas.extend(parsed);
        }
    }
    Ok(metas)
}

fn lit_str(expr: &Expr) -> syn::Result<String> {
    if let Expr::Lit(expr_lit) = expr {
        if let Lit::Str(s) = &expr_lit.lit {
            return Ok(s.value());
        }
    }
    Err(syn::Error::new_spanned(expr, "expected a string literal"))
}

fn lit_int(expr: &Expr) -> syn::Result<i64> {
    match expr {
        Expr::Lit(expr_lit) => {
            if let Lit::Int(i) = &expr_lit.lit {
                return i.base10_parse();
            }
        }
        Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Neg(_)) => {
            return lit_int(&unary.expr).map(|v| -v);
        }
        _ => {}
    }
    Err(syn::Error::new_spanned(expr, "expected an integer literal"))
}

fn choice_values(choices: &str, integers: bool) -> Vec<TokenStream2> {
    choices
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| match c.parse::<i64>() {
            Ok(n) if integers => quote! { #n },
            _ => quote! { #c },
        })
        .collect()
}

fn get_tool_name(input: &DeriveInput) -> syn::Result<String> {
    for meta in tool_metas(&input.attrs)? {
        if let Meta::NameValue(nv) = &meta {
            if nv.path.is_ident("name") {
                return lit_str(&nv.value);
            }
        }
    }

    Ok(to_snake_case(&input.ident.to_string()))
}

fn get_doc_comment(attrs: &[Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        docs.push(s.value().trim().to_string());
                    }
                }
            }
        }
    }
    docs.join(" ")
}

fn last_segment_ident(ty: &Type) -> Option<String> {
    if let Type::Path(type_path) = ty {
        return type_path.path.segments.last().map(|s| s.ident.to_string());
    }
    None
}

fn is_option_type(ty: &Type) -> bool {
    last_segment_ident(ty).as_deref() == Some("Option")
}

fn is_integer_type(ty: &Type) -> bool {
    if let Some(inner) = option_inner(ty) {
        return is_integer_type(inner);
    }
    matches!(
        last_segment_ident(ty).as_deref(),
        Some("i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize")
    )
}

fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
            return Some(inner);
        }
    }
    None
}

fn type_to_schema(ty: &Type) -> syn::Result<TokenStream2> {
    if let Some(inner) = option_inner(ty) {
        return type_to_schema(inner);
    }
    let Type::Path(type_path) = ty else {
        return Ok(quote! { serde_json::json!({}) });
    };
    let Some(segment) = type_path.path.segments.last() else {
        return Ok(quote! { serde_json::json!({}) });
    };

    Ok(match segment.ident.to_string().as_str() {
        "String" | "str" => quote! { serde_json::json!({"type": "string"}) },
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
            quote! { serde_json::json!({"type": "integer"}) }
        }
        "f32" | "f64" => quote! { serde_json::json!({"type": "number"}) },
        "bool" => quote! { serde_json::json!({"type": "boolean"}) },
        "Vec" => {
            if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                    let inner_schema = type_to_schema(inner)?;
                    return Ok(quote! {
                        serde_json::json!({
                            "type": "array",
                            "items": #inner_schema
                        })
                    });
                }
            }
            quote! { serde_json::json!({"type": "array"}) }
        }
        // Maps, serde_json::Value and nested structs
        _ => quote! { serde_json::json!({"type": "object"}) },
    })
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
