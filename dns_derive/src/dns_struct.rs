// generate the ToFromNetworkOrder impl for a DNS structure: each field is
// converted in declaration order, which is exactly the order on the wire
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DataStruct, DeriveInput};

// verify the derive macro is applied to a structure
fn get_struct(ast: &DeriveInput) -> &DataStruct {
    if let Data::Struct(struct_token) = &ast.data {
        struct_token
    } else {
        panic!("<{}> is not a struct!", ast.ident);
    }
}

// create the impl methods for trait ToFromNetworkOrder
pub fn dns_struct(ast: &DeriveInput) -> TokenStream {
    // get struct data or panic
    let struct_token = get_struct(ast);

    // does the structure borrow from the receive buffer?
    let has_lifetime = ast.generics.lifetimes().next().is_some();

    // save structure name because we're gonna use it soon
    let structure_name = &ast.ident;

    // to_network_bytes() call for each field
    let to_method_calls = struct_token.fields.iter().map(|f| {
        let field_name = f.ident.as_ref().unwrap();

        quote! {
            length += ToFromNetworkOrder::to_network_bytes(&self.#field_name, buffer)?;
        }
    });

    // from_network_bytes() call for each field
    let from_method_calls = struct_token.fields.iter().map(|f| {
        let field_name = f.ident.as_ref().unwrap();

        quote! {
            ToFromNetworkOrder::from_network_bytes(&mut self.#field_name, buffer)?;
        }
    });

    // the impl is the same in both cases except for the lifetime on the type
    let new_code = if has_lifetime {
        quote! {
            impl<'a> ToFromNetworkOrder<'a> for #structure_name<'a> {
                fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
                    let mut length = 0usize;
                    #( #to_method_calls)*
                    Ok(length)
                }

                fn from_network_bytes(&mut self, buffer: &mut std::io::Cursor<&'a [u8]>) -> RebindResult<()> {
                    #( #from_method_calls)*
                    Ok(())
                }
            }
        }
    } else {
        quote! {
            impl<'a> ToFromNetworkOrder<'a> for #structure_name {
                fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
                    let mut length = 0usize;
                    #( #to_method_calls)*
                    Ok(length)
                }

                fn from_network_bytes(&mut self, buffer: &mut std::io::Cursor<&'a [u8]>) -> RebindResult<()> {
                    #( #from_method_calls)*
                    Ok(())
                }
            }
        }
    };

    // Hand the output tokens back to the compiler
    TokenStream::from(new_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::get_derive_input;

    const S1: &str = "struct Header { id: u16, count: u16 }";
    const E1: &str = "enum Foo { A = 1, B = 2 }";

    #[test]
    #[should_panic]
    fn not_a_struct() {
        let input = get_derive_input(E1);
        let _ = get_struct(&input);
    }

    #[test]
    fn plain_struct() {
        let input = get_derive_input(S1);
        let s = get_struct(&input);
        assert_eq!(s.fields.len(), 2);
        assert!(input.generics.lifetimes().next().is_none());
    }

    #[test]
    fn borrowed_struct() {
        let input = get_derive_input("struct Question<'a> { name: &'a str }");
        let _ = get_struct(&input);
        assert!(input.generics.lifetimes().next().is_some());
    }
}
