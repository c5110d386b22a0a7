//! `#[cached]`: attribute-macro sugar over the runtime invocation wrapper.
//!
//! Decorates an `async fn(..) -> Result<T, E>` so every call goes through an
//! `fncache::InvocationWrapper`, constructed once (on first call) and reused
//! for the lifetime of the process.
//!
//! ```ignore
//! #[cached(ttl = 60, prefix = "profile:")]
//! async fn load_profile(user_id: i64) -> Result<Profile, MyError> {
//!     // ... expensive lookup ...
//! }
//! ```

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::{Expr, ExprLit, FnArg, ItemFn, Lit, Meta, Pat, ReturnType, Token, Type};

#[derive(Default)]
struct CachedArgs {
    ttl_secs: Option<u64>,
    capacity: Option<usize>,
    discipline: String,
    prefix: Option<String>,
    key_fn: Option<syn::Path>,
    by: Option<Vec<String>>,
    user_id: Option<String>,
    dynamic_ttl: Option<syn::Path>,
}

#[proc_macro_attribute]
pub fn cached(attr: TokenStream, item: TokenStream) -> TokenStream {
    let parser = Punctuated::<Meta, Token![,]>::parse_terminated;
    let metas = match parser.parse(attr) {
        Ok(metas) => metas,
        Err(err) => return err.to_compile_error().into(),
    };

    let mut args = CachedArgs {
        discipline: "ttl".to_string(),
        ..Default::default()
    };

    for meta in metas.iter() {
        if let Err(err) = apply_meta(&mut args, meta) {
            return err.to_compile_error().into();
        }
    }

    let input = syn::parse_macro_input!(item as ItemFn);
    match expand(args, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn apply_meta(args: &mut CachedArgs, meta: &Meta) -> syn::Result<()> {
    let Meta::NameValue(nv) = meta else {
        return Err(syn::Error::new_spanned(
            meta,
            "expected `name = value` inside #[cached(...)]",
        ));
    };
    let ident = nv
        .path
        .get_ident()
        .ok_or_else(|| syn::Error::new_spanned(&nv.path, "unsupported #[cached] attribute"))?
        .to_string();

    match ident.as_str() {
        "ttl" => args.ttl_secs = Some(expect_int(&nv.value)?),
        "capacity" => args.capacity = Some(expect_int(&nv.value)? as usize),
        "discipline" => args.discipline = expect_str(&nv.value)?,
        "prefix" => args.prefix = Some(expect_str(&nv.value)?),
        "user_id" => args.user_id = Some(expect_str(&nv.value)?),
        "key_fn" => args.key_fn = Some(expect_path(&nv.value)?),
        "dynamic_ttl" => args.dynamic_ttl = Some(expect_path(&nv.value)?),
        "by" => args.by = Some(expect_str_array(&nv.value)?),
        other => {
            return Err(syn::Error::new_spanned(
                &nv.path,
                format!("unsupported #[cached] attribute `{other}`"),
            ))
        }
    }
    Ok(())
}

fn expect_int(expr: &Expr) -> syn::Result<u64> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(lit), ..
        }) => lit.base10_parse(),
        other => Err(syn::Error::new_spanned(other, "expected an integer literal")),
    }
}

fn expect_str(expr: &Expr) -> syn::Result<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(lit), ..
        }) => Ok(lit.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn expect_path(expr: &Expr) -> syn::Result<syn::Path> {
    match expr {
        Expr::Path(p) => Ok(p.path.clone()),
        other => Err(syn::Error::new_spanned(other, "expected a function path")),
    }
}

fn expect_str_array(expr: &Expr) -> syn::Result<Vec<String>> {
    match expr {
        Expr::Array(arr) => arr.elems.iter().map(expect_str).collect(),
        other => Err(syn::Error::new_spanned(
            other,
            "expected an array of string literals, e.g. by = [\"user_id\"]",
        )),
    }
}

fn expand(args: CachedArgs, input: ItemFn) -> syn::Result<proc_macro2::TokenStream> {
    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input.sig,
            "#[cached] only supports `async fn`",
        ));
    }

    let value_ty = extract_ok_type(&input.sig.output)?;
    let fn_name = &input.sig.ident;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let attrs = &input.attrs;

    let storage_ty: Type = match args.discipline.as_str() {
        "ttl" => syn::parse_quote!(::fncache::MemoryTtlStorage),
        "lru" => syn::parse_quote!(::fncache::MemoryLruStorage),
        other => {
            return Err(syn::Error::new_spanned(
                fn_name,
                format!("unknown discipline `{other}`, expected \"ttl\" or \"lru\""),
            ))
        }
    };

    let storage_ctor = match args.discipline.as_str() {
        "ttl" => quote! { ::fncache::MemoryTtlStorage::new() },
        "lru" => {
            let capacity = args.capacity.ok_or_else(|| {
                syn::Error::new_spanned(
                    fn_name,
                    "discipline = \"lru\" requires a `capacity = ..` argument",
                )
            })?;
            quote! { ::fncache::MemoryLruStorage::new(#capacity) }
        }
        _ => unreachable!(),
    };

    let default_ttl_field = match args.ttl_secs {
        Some(secs) => quote! { Some(::std::time::Duration::from_secs(#secs)) },
        None => quote! { ::fncache::CacheManagerConfig::default().default_ttl },
    };

    let prefix = args
        .prefix
        .unwrap_or_else(|| format!("{fn_name}:"));

    let param_names: Vec<syn::Ident> = input
        .sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pat_ty) => match pat_ty.pat.as_ref() {
                Pat::Ident(pat_ident) => Some(pat_ident.ident.clone()),
                _ => None,
            },
            FnArg::Receiver(_) => None,
        })
        .collect();

    let user_id_param = args.user_id.as_ref().map(|name| format_ident!("{name}"));

    let call_arg_pushes = param_names
        .iter()
        .filter(|name| Some(name.to_string()) != args.user_id)
        .map(|name| {
            let literal = name.to_string();
            quote! { .arg(#literal, &#name) }
        });

    let clone_bindings_for_producer = param_names.iter().map(|name| {
        quote! { let #name = #name.clone(); }
    });

    let user_id_expr = match &user_id_param {
        Some(ident) => quote! { Some(#ident.to_string()) },
        None => quote! { ::std::option::Option::None },
    };

    let with_selector = match &args.by {
        Some(fields) => quote! { .with_selector(::std::vec![#(#fields.to_string()),*]) },
        None => quote! {},
    };

    let with_key_fn = match &args.key_fn {
        Some(path) => quote! { .with_key_fn(#path) },
        None => quote! {},
    };

    let with_dynamic_ttl = match &args.dynamic_ttl {
        Some(path) => quote! { .with_dynamic_ttl(#path) },
        None => quote! {},
    };

    let wrapper_static =
        format_ident!("__FNCACHE_WRAPPER_{}", fn_name.to_string().to_uppercase());
    let procedure_id = fn_name.to_string();

    Ok(quote! {
        #(#attrs)*
        #vis #sig {
            static #wrapper_static: ::fncache::__private::once_cell::sync::Lazy<
                ::std::sync::Arc<::fncache::InvocationWrapper<#storage_ty, ::fncache::JsonSerializer, #value_ty>>,
            > = ::fncache::__private::once_cell::sync::Lazy::new(|| {
                let manager = ::fncache::CacheManager::with_config(
                    #storage_ctor,
                    ::fncache::CacheManagerConfig {
                        default_ttl: #default_ttl_field,
                        key_prefix: #prefix.to_string(),
                        ..::fncache::CacheManagerConfig::default()
                    },
                );
                ::std::sync::Arc::new(
                    ::fncache::InvocationWrapper::new(manager, #procedure_id)
                        #with_selector
                        #with_key_fn
                        #with_dynamic_ttl,
                )
            });

            let call_args = ::fncache::CallArgs::new()#(#call_arg_pushes)*;
            let user_id = #user_id_expr;

            #wrapper_static
                .call(
                    call_args,
                    user_id,
                    ::fncache::CallOptions::default(),
                    move || {
                        #(#clone_bindings_for_producer)*
                        async move #block
                    },
                )
                .await
        }
    })
}

fn extract_ok_type(output: &ReturnType) -> syn::Result<Type> {
    let ReturnType::Type(_, ty) = output else {
        return Err(syn::Error::new_spanned(
            output,
            "#[cached] requires a return type of `Result<T, E>`",
        ));
    };
    if let Type::Path(type_path) = ty.as_ref() {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Result" {
                if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(syn::GenericArgument::Type(t)) = args.args.first() {
                        return Ok(t.clone());
                    }
                }
            }
        }
    }
    Err(syn::Error::new_spanned(
        ty,
        "#[cached] requires a return type of `Result<T, E>`",
    ))
}
