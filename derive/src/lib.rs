//! # capstan-derive
//!
//! Attribute macros that turn plain functions into capabilities.
//!
//! | Macro | Generates an impl of |
//! |-------|----------------------|
//! | `#[tool]` | `capstan::Tool` |
//! | `#[prompt]` | `capstan::Prompt` |
//! | `#[resource(uri = "...")]` | `capstan::Resource` |
//!
//! For a function `echo`, the macro keeps the function and adds:
//!
//! 1. an `EchoArgs` struct holding one field per parameter, deriving
//!    `JsonSchema` and `Deserialize`;
//! 2. a unit struct `Echo` implementing the capability trait, ready to be
//!    registered in a catalog.
//!
//! ```rust
//! use capstan::tool;
//!
//! /// Echoes the input back.
//! #[tool]
//! pub fn echo(input: String) -> String {
//!     input
//! }
//!
//! #[tool(name = "generate-hash", description = "Hashes the input")]
//! pub async fn hash(
//!     #[param(description = "Text to hash")] input: String,
//!     #[param(default = "SHA256".to_string())] algorithm: String,
//! ) -> capstan::Result {
//!     Ok(format!("{algorithm}:{input}"))
//! }
//! ```
//!
//! ## Rules
//!
//! - Functions may be sync or async, and may not take `self`, generics or
//!   lifetimes.
//! - Parameters must be plain identifiers whose types implement
//!   `Deserialize` and `JsonSchema`.
//! - The return type may be `Result<T>` (any error convertible to
//!   `anyhow::Error`), a bare `T`, or nothing. `T` must convert into the
//!   capability's output type (`CallToolResult`, `GetPromptResult`, or
//!   resource contents).
//! - Name defaults to the function name; description defaults to the doc
//!   comment.
//! - `#[param(...)]` accepts `description = "..."`, `required = bool` and
//!   `default = <expr>`. `Option<T>` parameters and parameters with a default
//!   are optional.

use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    Attribute, Expr, FnArg, GenericArgument, Ident, ItemFn, LitBool, LitStr, Pat, PathArguments,
    ReturnType, Token, Type, Visibility,
    parse::{Parse, ParseStream},
    parse_macro_input,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Tool,
    Prompt,
    Resource,
}

impl Kind {
    const fn supported(self) -> &'static [&'static str] {
        match self {
            Self::Tool | Self::Prompt => &["name", "rename", "description", "title"],
            Self::Resource => &["uri", "name", "description", "mime_type"],
        }
    }
}

/// Arguments of the `#[tool]`, `#[prompt]` and `#[resource]` attributes.
#[derive(Default)]
struct CapabilityArgs {
    name: Option<String>,
    description: Option<String>,
    title: Option<String>,
    uri: Option<String>,
    mime_type: Option<String>,
    keys: Vec<Ident>,
}

impl Parse for CapabilityArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = Self::default();

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            let _: Token![=] = input.parse()?;
            let value: LitStr = input.parse()?;

            let slot = match ident.to_string().as_str() {
                "name" | "rename" => &mut args.name,
                "description" => &mut args.description,
                "title" => &mut args.title,
                "uri" => &mut args.uri,
                "mime_type" => &mut args.mime_type,
                _ => {
                    return Err(syn::Error::new_spanned(
                        ident,
                        "unknown attribute. Supported: name, description, title, uri, mime_type",
                    ));
                }
            };
            *slot = Some(value.value());
            args.keys.push(ident);

            if input.peek(Token![,]) {
                let _: Token![,] = input.parse()?;
            }
        }

        Ok(args)
    }
}

impl CapabilityArgs {
    fn check(&self, kind: Kind) -> syn::Result<()> {
        let supported = kind.supported();
        if let Some(key) = self
            .keys
            .iter()
            .find(|key| !supported.contains(&key.to_string().as_str()))
        {
            return Err(syn::Error::new_spanned(
                key,
                format!("unsupported here. Supported: {}", supported.join(", ")),
            ));
        }
        Ok(())
    }
}

/// One function parameter, with its `#[param]` settings.
struct Param {
    ident: Ident,
    ty: Type,
    description: Option<String>,
    required: Option<bool>,
    default: Option<Expr>,
}

/// Converts a function into a tool.
///
/// ```rust
/// use capstan::tool;
///
/// /// Adds two numbers.
/// #[tool]
/// pub fn add(a: f64, b: f64) -> String {
///     (a + b).to_string()
/// }
///
/// #[tool(name = "fail", description = "Always fails")]
/// pub async fn boom() -> capstan::Result<String> {
///     Err(capstan::Error::msg("boom"))
/// }
/// ```
///
/// # Attributes
///
/// - `name` (or `rename`): tool name, defaults to the function name.
/// - `description`: defaults to the doc comment.
/// - `title`: optional display title.
#[proc_macro_attribute]
pub fn tool(args: TokenStream, input: TokenStream) -> TokenStream {
    expand(Kind::Tool, args, input)
}

/// Converts a function into a prompt.
///
/// ```rust
/// use capstan::{PromptMessage, prompt};
///
/// /// Asks for a code review.
/// #[prompt]
/// pub fn review(code: String) -> Vec<PromptMessage> {
///     vec![PromptMessage::user_text(format!("Review:\n{code}"))]
/// }
/// ```
#[proc_macro_attribute]
pub fn prompt(args: TokenStream, input: TokenStream) -> TokenStream {
    expand(Kind::Prompt, args, input)
}

/// Converts a function into a resource.
///
/// Template variables of `uri` become the function's parameters.
///
/// ```rust
/// use capstan::resource;
///
/// #[resource(uri = "test://{name}", description = "Greets by name")]
/// pub fn greeting(name: String) -> String {
///     format!("Hello, {name}")
/// }
/// ```
///
/// # Attributes
///
/// - `uri` (required): concrete URI or URI template.
/// - `name`: defaults to the function name.
/// - `description`: defaults to the doc comment.
/// - `mime_type`: MIME type of the contents.
#[proc_macro_attribute]
pub fn resource(args: TokenStream, input: TokenStream) -> TokenStream {
    expand(Kind::Resource, args, input)
}

fn expand(kind: Kind, args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as CapabilityArgs);
    let input_fn = parse_macro_input!(input as ItemFn);

    match capability_impl(kind, args, input_fn) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn capability_impl(
    kind: Kind,
    args: CapabilityArgs,
    mut input_fn: ItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    args.check(kind)?;

    let sig = &input_fn.sig;
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "capability functions cannot be generic",
        ));
    }

    let fn_name = sig.ident.clone();
    let fn_vis = input_fn.vis.clone();
    let is_async = sig.asyncness.is_some();
    let returns = analyze_return(&sig.output);
    let params = collect_params(&mut input_fn)?;

    let name = args.name.clone().unwrap_or_else(|| fn_name.to_string());
    let description = args
        .description
        .clone()
        .or_else(|| doc_comment(&input_fn.attrs))
        .unwrap_or_default();

    let struct_name = format_ident!("{}", fn_name.to_string().to_case(Case::Pascal));
    let args_name = format_ident!("{}Args", struct_name);
    let args_struct = args_struct(&fn_vis, &args_name, &params);

    let idents: Vec<&Ident> = params.iter().map(|param| &param.ident).collect();
    let call = if is_async {
        quote! { #fn_name(#(#idents),*).await }
    } else {
        quote! { #fn_name(#(#idents),*) }
    };
    let (output, body) = match &returns {
        Returns::Unit => (
            quote! { () },
            quote! {
                #call;
                ::core::result::Result::Ok(())
            },
        ),
        Returns::Result(ty) => (quote! { #ty }, quote! { ::core::result::Result::Ok(#call?) }),
        Returns::Plain(ty) => (quote! { #ty }, quote! { ::core::result::Result::Ok(#call) }),
    };

    let overrides = overrides_fn(&params);
    let title = args.title.as_ref().map(|title| {
        quote! {
            fn title(&self) -> ::core::option::Option<::std::borrow::Cow<'static, str>> {
                ::core::option::Option::Some(::std::borrow::Cow::Borrowed(#title))
            }
        }
    });

    let capability = match kind {
        Kind::Tool => quote! {
            impl ::capstan::Tool for #struct_name {
                fn name(&self) -> ::std::borrow::Cow<'static, str> {
                    ::std::borrow::Cow::Borrowed(#name)
                }
                fn description(&self) -> ::std::borrow::Cow<'static, str> {
                    ::std::borrow::Cow::Borrowed(#description)
                }
                #title
                #overrides
                type Arguments = #args_name;
                type Output = #output;

                async fn call(&self, args: Self::Arguments) -> ::capstan::Result<Self::Output> {
                    let #args_name { #(#idents),* } = args;
                    #body
                }
            }
        },
        Kind::Prompt => quote! {
            impl ::capstan::Prompt for #struct_name {
                fn name(&self) -> ::std::borrow::Cow<'static, str> {
                    ::std::borrow::Cow::Borrowed(#name)
                }
                fn description(&self) -> ::std::borrow::Cow<'static, str> {
                    ::std::borrow::Cow::Borrowed(#description)
                }
                #title
                #overrides
                type Arguments = #args_name;
                type Output = #output;

                async fn get(&self, args: Self::Arguments) -> ::capstan::Result<Self::Output> {
                    let #args_name { #(#idents),* } = args;
                    #body
                }
            }
        },
        Kind::Resource => {
            let Some(uri) = args.uri.as_ref() else {
                return Err(syn::Error::new_spanned(
                    &input_fn.sig.ident,
                    "resources need a `uri` attribute",
                ));
            };
            let description = optional_cow(&(!description.is_empty()).then_some(description));
            let mime_type = optional_cow(&args.mime_type);
            quote! {
                impl ::capstan::Resource for #struct_name {
                    fn uri(&self) -> ::std::borrow::Cow<'static, str> {
                        ::std::borrow::Cow::Borrowed(#uri)
                    }
                    fn name(&self) -> ::std::borrow::Cow<'static, str> {
                        ::std::borrow::Cow::Borrowed(#name)
                    }
                    fn description(&self) -> ::core::option::Option<::std::borrow::Cow<'static, str>> {
                        #description
                    }
                    fn mime_type(&self) -> ::core::option::Option<::std::borrow::Cow<'static, str>> {
                        #mime_type
                    }
                    type Arguments = #args_name;
                    type Output = #output;

                    async fn read(&self, args: Self::Arguments) -> ::capstan::Result<Self::Output> {
                        let #args_name { #(#idents),* } = args;
                        #body
                    }
                }
            }
        }
    };

    Ok(quote! {
        #input_fn

        #args_struct

        #[derive(::core::default::Default, ::core::fmt::Debug, ::core::clone::Clone, ::core::marker::Copy)]
        #fn_vis struct #struct_name;

        #capability
    })
}

fn optional_cow(value: &Option<String>) -> proc_macro2::TokenStream {
    value.as_ref().map_or_else(
        || quote! { ::core::option::Option::None },
        |value| quote! { ::core::option::Option::Some(::std::borrow::Cow::Borrowed(#value)) },
    )
}

/// Reads the `#[param]` attributes of every parameter and strips them from
/// the function, which is emitted unchanged otherwise.
fn collect_params(input_fn: &mut ItemFn) -> syn::Result<Vec<Param>> {
    let mut params = Vec::new();

    for arg in &mut input_fn.sig.inputs {
        let FnArg::Typed(pat_type) = arg else {
            return Err(syn::Error::new_spanned(
                arg,
                "self parameters are not supported in capability functions",
            ));
        };
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            return Err(syn::Error::new_spanned(
                &pat_type.pat,
                "capability parameters must be plain identifiers",
            ));
        };

        let mut param = Param {
            ident: pat_ident.ident.clone(),
            ty: (*pat_type.ty).clone(),
            description: None,
            required: None,
            default: None,
        };

        let mut kept = Vec::with_capacity(pat_type.attrs.len());
        for attr in pat_type.attrs.drain(..) {
            if attr.path().is_ident("param") {
                parse_param_attr(&attr, &mut param)?;
            } else {
                kept.push(attr);
            }
        }
        pat_type.attrs = kept;

        params.push(param);
    }

    Ok(params)
}

fn parse_param_attr(attr: &Attribute, param: &mut Param) -> syn::Result<()> {
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("description") {
            let value: LitStr = meta.value()?.parse()?;
            param.description = Some(value.value());
        } else if meta.path.is_ident("required") {
            let value: LitBool = meta.value()?.parse()?;
            param.required = Some(value.value);
        } else if meta.path.is_ident("default") {
            param.default = Some(meta.value()?.parse()?);
        } else {
            return Err(meta.error("unsupported param attribute. Supported: description, required, default"));
        }
        Ok(())
    })
}

fn args_struct(vis: &Visibility, args_name: &Ident, params: &[Param]) -> proc_macro2::TokenStream {
    let mut fields = Vec::with_capacity(params.len());
    let mut default_fns = Vec::new();

    for param in params {
        let ident = &param.ident;
        let ty = &param.ty;
        let description = param
            .description
            .as_ref()
            .map(|text| quote! { #[schemars(description = #text)] });
        let default = param.default.as_ref().map(|expr| {
            let default_fn = format_ident!("__default_{}", ident);
            let path = format!("{args_name}::{default_fn}");
            default_fns.push(quote! {
                fn #default_fn() -> #ty {
                    #expr
                }
            });
            quote! { #[serde(default = #path)] }
        });
        fields.push(quote! {
            #description
            #default
            #vis #ident: #ty,
        });
    }

    let defaults = (!default_fns.is_empty()).then(|| {
        quote! {
            impl #args_name {
                #(#default_fns)*
            }
        }
    });

    quote! {
        #[derive(
            ::capstan::__private::schemars::JsonSchema,
            ::capstan::__private::serde::Deserialize,
            ::core::fmt::Debug
        )]
        #[schemars(crate = "::capstan::__private::schemars")]
        #[serde(crate = "::capstan::__private::serde")]
        #vis struct #args_name {
            #(#fields)*
        }

        #defaults
    }
}

fn overrides_fn(params: &[Param]) -> Option<proc_macro2::TokenStream> {
    let entries: Vec<_> = params
        .iter()
        .filter_map(|param| {
            let required = param.required?;
            let name = param.ident.to_string();
            Some(quote! { ::capstan::ParamOverride::new(#name).required(#required) })
        })
        .collect();

    (!entries.is_empty()).then(|| {
        quote! {
            fn parameter_overrides(&self) -> &'static [::capstan::ParamOverride] {
                const OVERRIDES: &[::capstan::ParamOverride] = &[#(#entries),*];
                OVERRIDES
            }
        }
    })
}

fn doc_comment(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            syn::Meta::NameValue(syn::MetaNameValue {
                value:
                    Expr::Lit(syn::ExprLit {
                        lit: syn::Lit::Str(text),
                        ..
                    }),
                ..
            }) => Some(text.value().trim().to_string()),
            _ => None,
        })
        .collect();

    let doc = lines.join("\n").trim().to_string();
    (!doc.is_empty()).then_some(doc)
}

enum Returns {
    Unit,
    Result(Type),
    Plain(Type),
}

/// Classifies the return type by its last path segment: anything named
/// `Result` is unwrapped with `?`.
fn analyze_return(output: &ReturnType) -> Returns {
    let ReturnType::Type(_, ty) = output else {
        return Returns::Unit;
    };
    if let Type::Tuple(tuple) = ty.as_ref() {
        if tuple.elems.is_empty() {
            return Returns::Unit;
        }
    }
    let Type::Path(path) = ty.as_ref() else {
        return Returns::Plain((**ty).clone());
    };
    let Some(last) = path.path.segments.last() else {
        return Returns::Plain((**ty).clone());
    };
    if last.ident != "Result" {
        return Returns::Plain((**ty).clone());
    }

    match &last.arguments {
        PathArguments::AngleBracketed(generics) => generics
            .args
            .iter()
            .find_map(|arg| match arg {
                GenericArgument::Type(inner) => Some(Returns::Result(inner.clone())),
                _ => None,
            })
            .unwrap_or_else(|| Returns::Plain((**ty).clone())),
        // `capstan::Result` defaults to `String`.
        _ => Returns::Result(syn::parse_quote! { ::std::string::String }),
    }
}
