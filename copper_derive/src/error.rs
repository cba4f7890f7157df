//! `#[derive(Error)]`: `Display` from `#[error(...)]` attributes plus `std::error::Error`.
//!
//! ```ignore
//! #[derive(Debug, Error)]
//! pub enum LoadError {
//!     #[error(transparent)]
//!     Bytecode(BytecodeError),
//!     #[error("memory payload of {size} bytes exceeds the capacity of {capacity} bytes")]
//!     MemoryOverflow { size: usize, capacity: usize },
//!     #[error("unknown escape '\\{0}'")]
//!     UnknownEscape(char),
//! }
//! ```
//!
//! Messages may name struct fields (`{size}`, `{size:>4}`) or tuple fields by
//! position (`{0}`). Fields a message does not mention are ignored.
//! `transparent` forwards both `Display` and `Error::source` to the single field
//! of a variant.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Ident, LitStr, Member, parse_macro_input};

enum Message {
    Format(LitStr),
    Transparent,
}

/// One `match self` arm of the generated impls.
struct Arm {
    display: TokenStream2,
    source: Option<TokenStream2>,
}

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let arms = match &input.data {
        Data::Enum(data) => data
            .variants
            .iter()
            .map(|variant| {
                let ident = &variant.ident;
                arm(quote!(Self::#ident), &variant.fields, message(&variant.attrs, ident)?, ident)
            })
            .collect::<syn::Result<Vec<_>>>()?,
        Data::Struct(data) => {
            let ident = &input.ident;
            vec![arm(quote!(Self), &data.fields, message(&input.attrs, ident)?, ident)?]
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(input, "unions cannot derive Error"));
        }
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let display_arms = arms.iter().map(|a| &a.display);
    let source_arms: Vec<_> = arms.iter().filter_map(|a| a.source.as_ref()).collect();
    let source = if source_arms.is_empty() {
        quote!()
    } else {
        quote! {
            fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                #[allow(unreachable_patterns)]
                match self {
                    #(#source_arms)*
                    _ => ::std::option::Option::None,
                }
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#display_arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
            #source
        }
    })
}

fn message(attrs: &[Attribute], owner: &Ident) -> syn::Result<Message> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(owner, format!("`{owner}` needs an #[error(\"...\")] attribute"))
        })?;

    let tokens = attr.meta.require_list()?.tokens.clone();
    if let Ok(ident) = syn::parse2::<Ident>(tokens.clone())
        && ident == "transparent"
    {
        return Ok(Message::Transparent);
    }
    syn::parse2::<LitStr>(tokens)
        .map(Message::Format)
        .map_err(|_| syn::Error::new_spanned(attr, "expected #[error(\"message\")] or #[error(transparent)]"))
}

fn arm(path: TokenStream2, fields: &Fields, message: Message, owner: &Ident) -> syn::Result<Arm> {
    let format = match message {
        Message::Transparent => return transparent_arm(path, fields, owner),
        Message::Format(lit) => lit,
    };

    let text = format.value();
    let referenced = placeholders(&text);
    let mut bindings = Vec::new();
    let mut args = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let (member, arg) = match &field.ident {
            Some(ident) => (Member::Named(ident.clone()), ident.to_string()),
            None => (Member::Unnamed(index.into()), index.to_string()),
        };
        if !referenced.contains(&arg) {
            continue;
        }
        let binding = format_ident!("__field{}", arg);
        args.push(quote!(#binding = #binding));
        bindings.push(quote!(#member: #binding));
    }

    let format = LitStr::new(&rename_placeholders(&text, fields), format.span());
    let pattern = quote!(#path { #(#bindings,)* .. });
    Ok(Arm {
        display: quote!(#pattern => ::std::write!(f, #format #(, #args)*),),
        source: None,
    })
}

fn transparent_arm(path: TokenStream2, fields: &Fields, owner: &Ident) -> syn::Result<Arm> {
    if fields.len() != 1 {
        return Err(syn::Error::new_spanned(
            owner,
            "#[error(transparent)] needs exactly one field",
        ));
    }
    let member = match fields.iter().next().and_then(|f| f.ident.clone()) {
        Some(ident) => Member::Named(ident),
        None => Member::Unnamed(0.into()),
    };
    let inner = Ident::new("__inner", Span::call_site());
    Ok(Arm {
        display: quote!(#path { #member: #inner } => ::std::fmt::Display::fmt(#inner, f),),
        source: Some(quote!(#path { #member: #inner } => ::std::error::Error::source(#inner),)),
    })
}

/// Names referenced by `{...}` placeholders, without format specs. `{{` is skipped.
fn placeholders(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        rest = &rest[start + 1..];
        if let Some(escaped) = rest.strip_prefix('{') {
            rest = escaped;
            continue;
        }
        let end = rest.find(['}', ':']).unwrap_or(rest.len());
        names.push(rest[..end].trim().to_string());
        rest = &rest[end..];
    }
    names
}

/// Points every placeholder at the `__field*` binding of its field.
fn rename_placeholders(text: &str, fields: &Fields) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..=start]);
        rest = &rest[start + 1..];
        if let Some(escaped) = rest.strip_prefix('{') {
            out.push('{');
            rest = escaped;
            continue;
        }
        let end = rest.find(['}', ':']).unwrap_or(rest.len());
        let name = rest[..end].trim();
        let known = fields.iter().enumerate().any(|(index, field)| match &field.ident {
            Some(ident) => ident == name,
            None => index.to_string() == name,
        });
        if known {
            out.push_str("__field");
        }
        out.push_str(name);
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}
