//! `#[interpose]`: turns a Rust logic function into an exported C symbol that
//! shadows the next definition of the same symbol in the dynamic loader's
//! search order.
//!
//! The logic function takes the genuine implementation as its first argument,
//! followed by the C arguments of the symbol it replaces:
//!
//! ```ignore
//! #[interpose(symbol = "lstat")]
//! fn proc_lstat(
//!     real: unsafe extern "C" fn(path: *const c_char, buf: *mut stat) -> c_int,
//!     path: *const c_char,
//!     buf: *mut stat,
//! ) -> c_int {
//!     unsafe { real(path, buf) }
//! }
//! ```
//!
//! The expansion keeps the logic function as written and adds a `OnceLock`
//! caching `dlsym(RTLD_NEXT, "lstat")` plus a `#[no_mangle] extern "C" fn lstat`
//! that forwards to the logic function.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, AttributeArgs, Error, FnArg, ItemFn, Lit, Meta, NestedMeta, Pat, PatType,
    Result, ReturnType, Signature, Type,
};

fn parse_interpose_attributes(args: &[NestedMeta]) -> Result<String> {
    let mut symbol = None;

    for arg in args {
        match arg {
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("symbol") => {
                let Lit::Str(lit) = &nv.lit else {
                    return Err(Error::new_spanned(&nv.lit, "expected a string literal for symbol"));
                };
                if symbol.is_some() {
                    return Err(Error::new_spanned(nv, "duplicate 'symbol' attribute"));
                }
                let value = lit.value();
                if !is_c_identifier(&value) {
                    return Err(Error::new_spanned(lit, "symbol must be a valid C identifier"));
                }
                symbol = Some(value);
            }
            NestedMeta::Meta(Meta::NameValue(nv)) => {
                return Err(Error::new_spanned(&nv.path, "unknown attribute key, expected 'symbol'"));
            }
            other => {
                return Err(Error::new_spanned(
                    other,
                    "expected name-value attribute, like symbol = \"...\"",
                ));
            }
        }
    }

    symbol.ok_or_else(|| Error::new(Span::call_site(), "missing required attribute 'symbol = \"...\"'"))
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn validate_logic_fn_signature(sig: &Signature) -> Result<()> {
    let Some(first) = sig.inputs.first() else {
        return Err(Error::new_spanned(
            &sig.inputs,
            "interpose logic function must accept at least one argument (the genuine function pointer)",
        ));
    };

    match first {
        FnArg::Typed(PatType { ty, .. }) => {
            if !matches!(**ty, Type::BareFn(_)) {
                return Err(Error::new_spanned(
                    ty,
                    "the first argument must be a function pointer (e.g. `real: unsafe extern \"C\" fn(...) -> ...`)",
                ));
            }
        }
        FnArg::Receiver(_) => {
            return Err(Error::new_spanned(first, "interpose logic function cannot take 'self'"));
        }
    }

    // The remaining arguments are re-emitted on the C wrapper and forwarded by name.
    for arg in sig.inputs.iter().skip(1) {
        match arg {
            FnArg::Typed(PatType { pat, .. }) if matches!(**pat, Pat::Ident(_)) => {}
            other => {
                return Err(Error::new_spanned(
                    other,
                    "forwarded arguments must be plain identifiers like `path: *const c_char`",
                ));
            }
        }
    }
    Ok(())
}

fn expand(symbol_name: &str, logic_fn: &ItemFn) -> proc_macro2::TokenStream {
    let logic_fn_ident = &logic_fn.sig.ident;

    let forwarded_inputs = logic_fn.sig.inputs.iter().skip(1).collect::<Vec<_>>();
    let (forwarded_idents, forwarded_types): (Vec<_>, Vec<_>) = forwarded_inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(PatType { pat, ty, .. }) => Some((pat, ty)),
            FnArg::Receiver(_) => None,
        })
        .unzip();

    let output = match &logic_fn.sig.output {
        ReturnType::Default => quote! { -> () },
        ReturnType::Type(_, ty) => quote! { -> #ty },
    };
    let genuine_fn_type = quote! { unsafe extern "C" fn(#(#forwarded_types),*) #output };

    let exported_ident = format_ident!("{}", symbol_name);
    let cache_ident = format_ident!("REAL_{}", symbol_name.to_uppercase());
    let symbol_cstr = format!("{}\0", symbol_name);

    quote! {
        #logic_fn

        static #cache_ident: ::std::sync::OnceLock<#genuine_fn_type> = ::std::sync::OnceLock::new();

        #[no_mangle]
        pub unsafe extern "C" fn #exported_ident(#(#forwarded_inputs),*) #output {
            let genuine = #cache_ident.get_or_init(|| {
                let addr = ::libc::dlsym(
                    ::libc::RTLD_NEXT,
                    #symbol_cstr.as_ptr() as *const ::libc::c_char,
                );
                if addr.is_null() {
                    eprintln!(
                        "[proc-eperm-shim] FATAL: dlsym(RTLD_NEXT, \"{}\") found no definition. Aborting.",
                        #symbol_name,
                    );
                    ::std::process::abort();
                }
                ::std::mem::transmute::<*mut ::libc::c_void, #genuine_fn_type>(addr)
            });

            #logic_fn_ident(*genuine, #(#forwarded_idents),*)
        }
    }
}

#[proc_macro_attribute]
pub fn interpose(args: TokenStream, item: TokenStream) -> TokenStream {
    let attr_args = parse_macro_input!(args as AttributeArgs);
    let logic_fn = parse_macro_input!(item as ItemFn);

    let symbol_name = match parse_interpose_attributes(&attr_args) {
        Ok(symbol) => symbol,
        Err(err) => return err.to_compile_error().into(),
    };

    if let Err(err) = validate_logic_fn_signature(&logic_fn.sig) {
        return err.to_compile_error().into();
    }

    expand(&symbol_name, &logic_fn).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn args(list: Vec<NestedMeta>) -> Result<String> {
        parse_interpose_attributes(&list)
    }

    #[test]
    fn symbol_is_required() {
        let err = args(vec![]).unwrap_err();
        assert!(err.to_string().contains("missing required attribute"));
    }

    #[test]
    fn accepts_symbol() {
        assert_eq!(args(vec![parse_quote!(symbol = "readlinkat")]).unwrap(), "readlinkat");
    }

    #[test]
    fn rejects_unknown_key_and_bad_values() {
        assert!(args(vec![parse_quote!(library = "libc.so.6")]).is_err());
        assert!(args(vec![parse_quote!(symbol = 3)]).is_err());
        assert!(args(vec![parse_quote!(symbol)]).is_err());
        assert!(args(vec![parse_quote!("lstat")]).is_err());
        assert!(args(vec![parse_quote!(symbol = "not a symbol")]).is_err());
        assert!(args(vec![parse_quote!(symbol = "lstat"), parse_quote!(symbol = "stat")]).is_err());
    }

    #[test]
    fn c_identifiers() {
        assert!(is_c_identifier("fstatat"));
        assert!(is_c_identifier("__lxstat64"));
        assert!(!is_c_identifier(""));
        assert!(!is_c_identifier("1stat"));
        assert!(!is_c_identifier("read-link"));
    }

    #[test]
    fn logic_fn_needs_genuine_pointer_first() {
        let ok: Signature = parse_quote! {
            fn hook(real: unsafe extern "C" fn(p: *const c_char) -> c_int, p: *const c_char) -> c_int
        };
        assert!(validate_logic_fn_signature(&ok).is_ok());

        let empty: Signature = parse_quote! { fn hook() -> c_int };
        assert!(validate_logic_fn_signature(&empty).is_err());

        let not_fn_ptr: Signature = parse_quote! { fn hook(p: *const c_char) -> c_int };
        assert!(validate_logic_fn_signature(&not_fn_ptr).is_err());

        let receiver: Signature = parse_quote! { fn hook(&self) -> c_int };
        assert!(validate_logic_fn_signature(&receiver).is_err());
    }

    #[test]
    fn forwarded_args_must_be_identifiers() {
        let tuple_pat: Signature = parse_quote! {
            fn hook(real: unsafe extern "C" fn(c_int, c_int) -> c_int, (a, b): (c_int, c_int)) -> c_int
        };
        assert!(validate_logic_fn_signature(&tuple_pat).is_err());
    }

    #[test]
    fn expansion_exports_symbol_and_cache() {
        let logic: ItemFn = parse_quote! {
            fn proc_lstat(
                real: unsafe extern "C" fn(path: *const c_char, buf: *mut stat) -> c_int,
                path: *const c_char,
                buf: *mut stat,
            ) -> c_int {
                unsafe { real(path, buf) }
            }
        };
        let tokens = expand("lstat", &logic).to_string();
        assert!(tokens.contains("static REAL_LSTAT"));
        assert!(tokens.contains("no_mangle"));
        assert!(tokens.contains("extern \"C\" fn lstat"));
        assert!(tokens.contains("proc_lstat (* genuine , path , buf)"));
    }
}
